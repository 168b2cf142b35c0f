use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::booking::BookingService;
use crate::error::Result;

/// Background task that periodically cancels bookings whose payment window
/// has elapsed.
///
/// A failed run is logged and counted; the next tick runs normally and picks
/// up whatever the failed run left behind.
pub struct ExpirySweeper {
    service: BookingService,
}

impl ExpirySweeper {
    pub fn new(service: BookingService) -> Self {
        Self { service }
    }

    /// Runs one sweep and returns the number of bookings cancelled.
    pub async fn run_once(&self) -> Result<u64> {
        let started = Instant::now();
        let result = self.service.cancel_expired_bookings().await;
        metrics::histogram!("expiry_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(0) => {}
            Ok(cancelled) => info!(cancelled, "Sweeper cancelled expired bookings"),
            Err(e) => {
                metrics::counter!("expiry_sweep_failures_total").increment(1);
                error!(error = %e, "Expiry sweep failed");
            }
        }
        result
    }

    /// Spawns the sweep loop. It stops when `shutdown` flips to `true` or
    /// its sender is dropped.
    pub fn spawn(
        service: BookingService,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let sweeper = Self::new(service);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_secs = period.as_secs(), "Expiry sweeper started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = sweeper.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Expiry sweeper stopped");
        })
    }
}
