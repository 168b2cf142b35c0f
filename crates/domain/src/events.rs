use std::sync::Arc;

use store::{StoreTransaction, UnitEvent, UnitEventType, UnitId};

use crate::clock::Clock;
use crate::error::Result;

/// Appends entries to the unit event log.
///
/// Events are written through the caller's transaction, so they commit or
/// roll back together with the change they describe.
#[derive(Clone)]
pub struct EventRecorder {
    clock: Arc<dyn Clock>,
}

impl EventRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Records an event for a unit.
    pub async fn record(
        &self,
        tx: &mut dyn StoreTransaction,
        unit_id: UnitId,
        event_type: UnitEventType,
        details: &str,
    ) -> Result<UnitEvent> {
        let event = UnitEvent::new(unit_id, event_type, details, self.clock.now());
        tx.append_event(&event).await?;
        tracing::info!(%unit_id, %event_type, details, "Recorded unit event");
        Ok(event)
    }
}
