//! Storage layer for the booking service.
//!
//! Two independent stores live here:
//! - the durable [`BookingStore`], which owns units, users, bookings, payments
//!   and the unit event log, and provides transactions with pessimistic row
//!   locks plus the overlap queries the booking lifecycle depends on
//! - the [`AvailabilityCounter`], a fast integer cell holding the cached
//!   "units available today" value, updated outside any store transaction

pub mod counter;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod redis_counter;
pub mod store;

pub use common::{BookingId, EventId, PaymentId, UnitId, UserId};
pub use counter::{AvailabilityCounter, InMemoryAvailabilityCounter};
pub use error::{CounterError, CounterResult, Result, StoreError};
pub use memory::{InMemoryBookingStore, InMemoryTransaction};
pub use postgres::{PgTransaction, PostgresBookingStore};
pub use query::{Page, SortDirection, UnitQuery, UnitSortField};
pub use record::{
    Booking, BookingStatus, DateRange, Money, ParseMoneyError, Payment, PaymentStatus, Unit,
    UnitEvent, UnitEventType, UnitType, User, Version,
};
pub use redis_counter::{AVAILABILITY_KEY, RedisAvailabilityCounter};
pub use store::{BookingStore, StoreTransaction};
