use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{CounterError, CounterResult};

/// A single shared integer cell holding the cached "units available today"
/// value.
///
/// Updates to the cell are atomic per call but are not coordinated with
/// durable store transactions.
#[async_trait]
pub trait AvailabilityCounter: Send + Sync {
    /// Returns true if the cell currently holds a value.
    async fn has_value(&self) -> CounterResult<bool>;

    /// Reads the cell. A missing value reads as 0; a non-numeric value is
    /// reset to 0 and read as 0.
    async fn get(&self) -> CounterResult<i64>;

    /// Overwrites the cell.
    async fn set(&self, value: i64) -> CounterResult<()>;

    /// Atomically adds one and returns the new value.
    async fn increment(&self) -> CounterResult<i64>;

    /// Atomically subtracts one, clamping the result at 0, and returns the
    /// stored value.
    async fn decrement_clamped(&self) -> CounterResult<i64>;
}

#[derive(Debug, Default)]
struct CounterCell {
    value: Option<i64>,
    unavailable: bool,
}

/// In-process availability counter.
///
/// Behaves like the Redis counter, including the ability to lose its value
/// and to become unreachable, which the cache layer must tolerate.
#[derive(Debug, Default)]
pub struct InMemoryAvailabilityCounter {
    cell: Mutex<CounterCell>,
}

impl InMemoryAvailabilityCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the stored value, as if the cache entry had been evicted.
    pub async fn clear(&self) {
        self.cell.lock().await.value = None;
    }

    /// Makes every subsequent call fail until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.cell.lock().await.unavailable = unavailable;
    }

    async fn cell(&self) -> CounterResult<tokio::sync::MutexGuard<'_, CounterCell>> {
        let cell = self.cell.lock().await;
        if cell.unavailable {
            return Err(CounterError::Unavailable("in-memory counter switched off".to_string()));
        }
        Ok(cell)
    }
}

#[async_trait]
impl AvailabilityCounter for InMemoryAvailabilityCounter {
    async fn has_value(&self) -> CounterResult<bool> {
        Ok(self.cell().await?.value.is_some())
    }

    async fn get(&self) -> CounterResult<i64> {
        Ok(self.cell().await?.value.unwrap_or(0))
    }

    async fn set(&self, value: i64) -> CounterResult<()> {
        self.cell().await?.value = Some(value);
        Ok(())
    }

    async fn increment(&self) -> CounterResult<i64> {
        let mut cell = self.cell().await?;
        let next = cell.value.unwrap_or(0) + 1;
        cell.value = Some(next);
        Ok(next)
    }

    async fn decrement_clamped(&self) -> CounterResult<i64> {
        let mut cell = self.cell().await?;
        let next = (cell.value.unwrap_or(0) - 1).max(0);
        cell.value = Some(next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_value_reads_as_zero() {
        let counter = InMemoryAvailabilityCounter::new();
        assert!(!counter.has_value().await.unwrap());
        assert_eq!(counter.get().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decrement_never_goes_below_zero() {
        let counter = InMemoryAvailabilityCounter::new();
        counter.set(1).await.unwrap();
        assert_eq!(counter.decrement_clamped().await.unwrap(), 0);
        assert_eq!(counter.decrement_clamped().await.unwrap(), 0);
        assert_eq!(counter.get().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_creates_missing_value() {
        let counter = InMemoryAvailabilityCounter::new();
        assert_eq!(counter.increment().await.unwrap(), 1);
        assert!(counter.has_value().await.unwrap());
    }

    #[tokio::test]
    async fn clear_drops_value() {
        let counter = InMemoryAvailabilityCounter::new();
        counter.set(4).await.unwrap();
        counter.clear().await;
        assert!(!counter.has_value().await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_counter_fails_every_call() {
        let counter = InMemoryAvailabilityCounter::new();
        counter.set_unavailable(true).await;
        assert!(matches!(
            counter.get().await,
            Err(CounterError::Unavailable(_))
        ));
        assert!(counter.increment().await.is_err());

        counter.set_unavailable(false).await;
        assert_eq!(counter.increment().await.unwrap(), 1);
    }
}
