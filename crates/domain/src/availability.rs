//! Maintenance of the cached "units available today" counter.
//!
//! The counter lives in a separate store and is never updated inside a
//! booking transaction. It is initialized lazily from the durable store the
//! first time any operation finds it empty, adjusted by ±1 afterwards, and
//! can be forced back in line with [`AvailabilityService::refresh_from_database`].

use std::sync::Arc;

use store::{AvailabilityCounter, BookingStore};
use tracing::info;

use crate::clock::Clock;
use crate::error::Result;

/// Owns the availability counter.
#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn BookingStore>,
    counter: Arc<dyn AvailabilityCounter>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        counter: Arc<dyn AvailabilityCounter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            counter,
            clock,
        }
    }

    /// Fills the counter from the durable store if it holds no value.
    pub async fn initialize_if_absent(&self) -> Result<()> {
        if !self.counter.has_value().await? {
            info!("Initializing availability counter");
            self.refresh_from_database().await?;
        }
        Ok(())
    }

    /// Adds one available unit.
    pub async fn increase(&self) -> Result<i64> {
        self.initialize_if_absent().await?;
        let value = self.counter.increment().await?;
        record_gauge(value);
        info!(available_units = value, "Availability increased");
        Ok(value)
    }

    /// Removes one available unit, never going below zero.
    pub async fn decrease_if_possible(&self) -> Result<i64> {
        self.initialize_if_absent().await?;
        let value = self.counter.decrement_clamped().await?;
        record_gauge(value);
        info!(available_units = value, "Availability decreased");
        Ok(value)
    }

    /// Adds `count` available units. Does nothing for `count <= 0`.
    pub async fn increase_by(&self, count: i64) -> Result<()> {
        if count <= 0 {
            return Ok(());
        }
        self.initialize_if_absent().await?;
        let mut value = 0;
        for _ in 0..count {
            value = self.counter.increment().await?;
        }
        record_gauge(value);
        info!(count, available_units = value, "Availability increased in batch");
        Ok(())
    }

    /// Returns the cached number of units available today.
    #[tracing::instrument(skip(self))]
    pub async fn get_available_units(&self) -> Result<i64> {
        self.initialize_if_absent().await?;
        Ok(self.counter.get().await?)
    }

    /// Recomputes the counter from the durable store and overwrites it.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_from_database(&self) -> Result<i64> {
        let count = self
            .store
            .count_units_available_on(self.clock.today())
            .await?;
        self.counter.set(count).await?;
        record_gauge(count);
        info!(available_units = count, "Availability refreshed from database");
        Ok(count)
    }
}

fn record_gauge(value: i64) {
    metrics::gauge!("available_units").set(value as f64);
}
