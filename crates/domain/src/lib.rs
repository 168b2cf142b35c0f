//! Domain layer for the unit booking service.
//!
//! This crate provides:
//! - the booking lifecycle state machine with per-unit overlap prevention
//! - maintenance of the cached "units available today" counter
//! - the unit catalog, booking parties and the unit event log
//! - the background sweep that releases unpaid bookings

pub mod availability;
pub mod booking;
pub mod clock;
pub mod error;
pub mod events;
pub mod policy;
pub mod pricing;
pub mod sweeper;
pub mod unit;
pub mod user;

pub use availability::AvailabilityService;
pub use booking::{BookingService, BookingView, CreateBooking};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, ErrorKind, Result};
pub use events::EventRecorder;
pub use policy::BookingPolicy;
pub use pricing::{Markup, ParseMarkupError};
pub use sweeper::ExpirySweeper;
pub use unit::{NewUnit, UnitSearch, UnitService, UnitView};
pub use user::{NewUser, UserService};
