use chrono::Duration;

use crate::pricing::Markup;

/// Business settings for the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// How long a new booking may stay unpaid before the sweep cancels it.
    pub payment_window: Duration,
    /// Multiplier applied to a unit's base cost.
    pub markup: Markup,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            payment_window: Duration::minutes(15),
            markup: Markup::default(),
        }
    }
}
