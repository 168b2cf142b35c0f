use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    Booking, BookingId, DateRange, Page, Payment, Result, Unit, UnitEvent, UnitId, UnitQuery, User,
    UserId,
};

/// Durable store for units, users, bookings, payments and unit events.
///
/// All writes go through a [`StoreTransaction`]. Reads on the store itself
/// see committed data only.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Opens a new transaction.
    ///
    /// Dropping the transaction without calling [`StoreTransaction::commit`]
    /// discards every write made through it and releases its locks.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Loads a unit by ID.
    async fn find_unit(&self, unit_id: UnitId) -> Result<Option<Unit>>;

    /// Loads a user by ID.
    async fn find_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Loads a booking by ID.
    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<Booking>>;

    /// Loads the payment attached to a booking.
    async fn find_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>>;

    /// Searches the unit catalog.
    async fn search_units(&self, query: &UnitQuery) -> Result<Page<Unit>>;

    /// Counts units with no active booking covering `day`.
    ///
    /// This is the authoritative value the availability counter caches.
    async fn count_units_available_on(&self, day: NaiveDate) -> Result<i64>;

    /// Returns the event log of a unit, oldest first.
    async fn events_for_unit(&self, unit_id: UnitId) -> Result<Vec<UnitEvent>>;
}

/// A unit of atomic work against the durable store.
///
/// Row locks taken through `lock_*` methods are held until the transaction
/// commits or is dropped. Writes become visible to other transactions only
/// on commit.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Takes an exclusive lock on a unit row and returns the unit.
    ///
    /// Blocks while another transaction holds the lock. Returns `None` if the
    /// unit does not exist.
    async fn lock_unit(&mut self, unit_id: UnitId) -> Result<Option<Unit>>;

    /// Takes an exclusive lock on a booking row and returns the booking.
    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<Booking>>;

    /// Locks and returns every `PENDING_PAYMENT` booking whose payment window
    /// ended at or before `now`.
    ///
    /// Rows are re-checked after locking, so a booking confirmed or cancelled
    /// by a transaction that held the lock first is not returned.
    async fn lock_expired_bookings(&mut self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Returns true if any active booking for the unit overlaps `dates`.
    async fn exists_active_booking(&mut self, unit_id: UnitId, dates: DateRange) -> Result<bool>;

    async fn find_user(&mut self, user_id: UserId) -> Result<Option<User>>;

    async fn find_payment_for_booking(&mut self, booking_id: BookingId)
    -> Result<Option<Payment>>;

    async fn insert_unit(&mut self, unit: &Unit) -> Result<()>;

    /// Inserts a user. Fails with `UniqueViolation` if the email is taken.
    async fn insert_user(&mut self, user: &User) -> Result<()>;

    async fn insert_booking(&mut self, booking: &Booking) -> Result<()>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Writes a modified booking.
    ///
    /// `booking.version` must be the version that was read; the stored row
    /// moves to the next version and the updated booking is returned. Fails
    /// with `ConcurrencyConflict` if the row changed in the meantime.
    async fn update_booking(&mut self, booking: &Booking) -> Result<Booking>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Appends an entry to the unit event log.
    async fn append_event(&mut self, event: &UnitEvent) -> Result<()>;

    /// Makes all writes durable and releases all locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards all writes and releases all locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
