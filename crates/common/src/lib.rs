//! Identifier types shared by every crate in the booking service.

mod types;

pub use types::{BookingId, EventId, PaymentId, UnitId, UserId};
