use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Booking, BookingId, BookingStatus, DateRange, Page, Payment, PaymentId, Result, SortDirection,
    StoreError, Unit, UnitEvent, UnitId, UnitQuery, UnitSortField, User, UserId, Version,
    store::{BookingStore, StoreTransaction},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Key of a lockable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Unit(UnitId),
    Booking(BookingId),
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowKey::Unit(id) => write!(f, "unit {id}"),
            RowKey::Booking(id) => write!(f, "booking {id}"),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    units: HashMap<UnitId, Unit>,
    users: HashMap<UserId, User>,
    bookings: HashMap<BookingId, Booking>,
    payments: HashMap<PaymentId, Payment>,
    events: Vec<UnitEvent>,
}

type LockRegistry = Arc<Mutex<HashMap<RowKey, Arc<Mutex<()>>>>>;

/// Row locks held by one transaction.
///
/// Dropping releases the locks and prunes registry entries nobody else is
/// holding or waiting on.
struct HeldLocks {
    registry: LockRegistry,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
}

impl HeldLocks {
    fn new(registry: LockRegistry) -> Self {
        Self {
            registry,
            guards: HashMap::new(),
        }
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        self.guards.clear();
        // Waiters clone the entry under the registry lock, so a count of one
        // means the entry is idle. If the registry is busy the next release
        // prunes instead.
        if let Ok(mut registry) = self.registry.try_lock() {
            registry.retain(|_, row| Arc::strong_count(row) > 1);
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_payment_insert: bool,
}

/// In-memory booking store for tests and single-process deployments.
///
/// Provides the same transactional contract as the PostgreSQL store: writes
/// are staged per transaction and applied atomically on commit, row locks
/// are exclusive and held until the transaction ends, and booking updates
/// are checked against the version that was read.
#[derive(Clone)]
pub struct InMemoryBookingStore {
    tables: Arc<RwLock<Tables>>,
    locks: LockRegistry,
    faults: Arc<Mutex<Faults>>,
    lock_timeout: Duration,
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InMemoryBookingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose lock waits give up after `lock_timeout`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            faults: Arc::new(Mutex::new(Faults::default())),
            lock_timeout,
        }
    }

    /// Makes the next `insert_payment` call fail.
    pub async fn fail_next_payment_insert(&self) {
        self.faults.lock().await.fail_next_payment_insert = true;
    }

    /// Returns the number of committed bookings.
    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    /// Returns the number of committed payments.
    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    /// Returns the number of committed unit events.
    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }

    /// Removes a payment row directly, bypassing transactions.
    ///
    /// Used to simulate integrity damage in tests.
    pub async fn remove_payment_for_booking(&self, booking_id: BookingId) {
        self.tables
            .write()
            .await
            .payments
            .retain(|_, p| p.booking_id != booking_id);
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }

    async fn acquire(&self, key: RowKey) -> Result<OwnedMutexGuard<()>> {
        let row = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(key.to_string()))
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            held: HeldLocks::new(self.locks.clone()),
            staged: Staged::default(),
        }))
    }

    async fn find_unit(&self, unit_id: UnitId) -> Result<Option<Unit>> {
        Ok(self.tables.read().await.units.get(&unit_id).cloned())
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&booking_id).cloned())
    }

    async fn find_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.booking_id == booking_id)
            .cloned())
    }

    async fn search_units(&self, query: &UnitQuery) -> Result<Page<Unit>> {
        let tables = self.tables.read().await;
        let mut units: Vec<&Unit> = tables
            .units
            .values()
            .filter(|u| {
                if let Some(unit_type) = query.unit_type
                    && u.unit_type != unit_type
                {
                    return false;
                }
                if let Some(rooms) = query.rooms
                    && u.rooms != rooms
                {
                    return false;
                }
                if let Some(floor) = query.floor
                    && u.floor != floor
                {
                    return false;
                }
                if let Some(min) = query.min_base_cost
                    && u.base_cost < min
                {
                    return false;
                }
                if let Some(max) = query.max_base_cost
                    && u.base_cost > max
                {
                    return false;
                }
                if let Some(range) = query.available_during
                    && tables.bookings.values().any(|b| {
                        b.unit_id == u.id && b.status.is_active() && b.dates.overlaps(&range)
                    })
                {
                    return false;
                }
                true
            })
            .collect();

        units.sort_by(|a, b| {
            let ordering = match query.sort_by {
                UnitSortField::Id => a.id.cmp(&b.id),
                UnitSortField::Rooms => a.rooms.cmp(&b.rooms).then(a.id.cmp(&b.id)),
                UnitSortField::Floor => a.floor.cmp(&b.floor).then(a.id.cmp(&b.id)),
                UnitSortField::BaseCost => a.base_cost.cmp(&b.base_cost).then(a.id.cmp(&b.id)),
                UnitSortField::CreatedAt => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
            };
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total_elements = units.len() as u64;
        let content = units
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.size as usize)
            .cloned()
            .collect();

        Ok(Page {
            content,
            page: query.page,
            size: query.size,
            total_elements,
        })
    }

    async fn count_units_available_on(&self, day: NaiveDate) -> Result<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .units
            .values()
            .filter(|u| {
                !tables
                    .bookings
                    .values()
                    .any(|b| b.unit_id == u.id && b.status.is_active() && b.dates.contains(day))
            })
            .count();
        Ok(count as i64)
    }

    async fn events_for_unit(&self, unit_id: UnitId) -> Result<Vec<UnitEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|e| e.unit_id == unit_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }
}

/// A booking staged for write, with the version it was read at.
///
/// `read_version` is `None` for bookings inserted by the transaction itself.
struct StagedBooking {
    booking: Booking,
    read_version: Option<Version>,
}

/// Writes made by a transaction that are not yet committed.
#[derive(Default)]
struct Staged {
    units: HashMap<UnitId, Unit>,
    users: HashMap<UserId, User>,
    bookings: HashMap<BookingId, StagedBooking>,
    payments: HashMap<PaymentId, Payment>,
    events: Vec<UnitEvent>,
}

impl Staged {
    fn unit<'a>(&'a self, tables: &'a Tables, id: UnitId) -> Option<&'a Unit> {
        self.units.get(&id).or_else(|| tables.units.get(&id))
    }

    fn user<'a>(&'a self, tables: &'a Tables, id: UserId) -> Option<&'a User> {
        self.users.get(&id).or_else(|| tables.users.get(&id))
    }

    fn booking<'a>(&'a self, tables: &'a Tables, id: BookingId) -> Option<&'a Booking> {
        self.bookings
            .get(&id)
            .map(|s| &s.booking)
            .or_else(|| tables.bookings.get(&id))
    }

    /// Committed bookings overlaid with this transaction's writes.
    fn bookings<'a>(&'a self, tables: &'a Tables) -> impl Iterator<Item = &'a Booking> + 'a {
        tables
            .bookings
            .values()
            .filter(|b| !self.bookings.contains_key(&b.id))
            .chain(self.bookings.values().map(|s| &s.booking))
    }

    fn payment_for<'a>(&'a self, tables: &'a Tables, booking_id: BookingId) -> Option<&'a Payment> {
        self.payments
            .values()
            .find(|p| p.booking_id == booking_id)
            .or_else(|| {
                tables
                    .payments
                    .values()
                    .find(|p| p.booking_id == booking_id && !self.payments.contains_key(&p.id))
            })
    }
}

fn is_expired_pending(booking: &Booking, now: DateTime<Utc>) -> bool {
    booking.status == BookingStatus::PendingPayment && booking.is_expired_at(now)
}

/// Transaction over an [`InMemoryBookingStore`].
pub struct InMemoryTransaction {
    store: InMemoryBookingStore,
    held: HeldLocks,
    staged: Staged,
}

impl InMemoryTransaction {
    /// Acquires a row lock unless this transaction already holds it.
    async fn lock(&mut self, key: RowKey) -> Result<()> {
        if !self.held.guards.contains_key(&key) {
            let guard = self.store.acquire(key).await?;
            self.held.guards.insert(key, guard);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_unit(&mut self, unit_id: UnitId) -> Result<Option<Unit>> {
        self.lock(RowKey::Unit(unit_id)).await?;
        let tables = self.store.tables.read().await;
        Ok(self.staged.unit(&tables, unit_id).cloned())
    }

    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<Booking>> {
        self.lock(RowKey::Booking(booking_id)).await?;
        let tables = self.store.tables.read().await;
        Ok(self.staged.booking(&tables, booking_id).cloned())
    }

    async fn lock_expired_bookings(&mut self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let mut candidates: Vec<BookingId> = {
            let tables = self.store.tables.read().await;
            self.staged
                .bookings(&tables)
                .filter(|b| is_expired_pending(b, now))
                .map(|b| b.id)
                .collect()
        };
        // A fixed lock order keeps concurrent sweeps from deadlocking.
        candidates.sort();
        for id in &candidates {
            self.lock(RowKey::Booking(*id)).await?;
        }

        let tables = self.store.tables.read().await;
        Ok(candidates
            .iter()
            .filter_map(|id| self.staged.booking(&tables, *id))
            .filter(|b| is_expired_pending(b, now))
            .cloned()
            .collect())
    }

    async fn exists_active_booking(&mut self, unit_id: UnitId, dates: DateRange) -> Result<bool> {
        let tables = self.store.tables.read().await;
        Ok(self
            .staged
            .bookings(&tables)
            .any(|b| b.unit_id == unit_id && b.status.is_active() && b.dates.overlaps(&dates)))
    }

    async fn find_user(&mut self, user_id: UserId) -> Result<Option<User>> {
        let tables = self.store.tables.read().await;
        Ok(self.staged.user(&tables, user_id).cloned())
    }

    async fn find_payment_for_booking(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>> {
        let tables = self.store.tables.read().await;
        Ok(self.staged.payment_for(&tables, booking_id).cloned())
    }

    async fn insert_unit(&mut self, unit: &Unit) -> Result<()> {
        self.staged.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        let taken = {
            let tables = self.store.tables.read().await;
            tables
                .users
                .values()
                .chain(self.staged.users.values())
                .any(|u| u.email == user.email)
        };
        if taken {
            return Err(StoreError::UniqueViolation(format!("email {}", user.email)));
        }
        self.staged.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<()> {
        self.staged.bookings.insert(
            booking.id,
            StagedBooking {
                booking: booking.clone(),
                read_version: None,
            },
        );
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        {
            let mut faults = self.store.faults.lock().await;
            if faults.fail_next_payment_insert {
                faults.fail_next_payment_insert = false;
                return Err(StoreError::Injected("payment insert".to_string()));
            }
        }
        let duplicate = {
            let tables = self.store.tables.read().await;
            self.staged.payment_for(&tables, payment.booking_id).is_some()
        };
        if duplicate {
            return Err(StoreError::UniqueViolation(format!(
                "payment for booking {}",
                payment.booking_id
            )));
        }
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<Booking> {
        let (current_version, read_version) = {
            let tables = self.store.tables.read().await;
            let current = self
                .staged
                .booking(&tables, booking.id)
                .ok_or_else(|| StoreError::RowNotFound(format!("booking {}", booking.id)))?;
            let read_version = match self.staged.bookings.get(&booking.id) {
                Some(staged) => staged.read_version,
                None => Some(current.version),
            };
            (current.version, read_version)
        };

        if current_version != booking.version {
            return Err(StoreError::ConcurrencyConflict {
                booking_id: booking.id,
                expected: booking.version,
                actual: current_version,
            });
        }

        let mut updated = booking.clone();
        updated.version = booking.version.next();
        self.staged.bookings.insert(
            booking.id,
            StagedBooking {
                booking: updated.clone(),
                read_version,
            },
        );
        Ok(updated)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let exists = {
            let tables = self.store.tables.read().await;
            self.staged.payments.contains_key(&payment.id)
                || tables.payments.contains_key(&payment.id)
        };
        if !exists {
            return Err(StoreError::RowNotFound(format!("payment {}", payment.id)));
        }
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn append_event(&mut self, event: &UnitEvent) -> Result<()> {
        self.staged.events.push(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            store,
            held,
            staged,
        } = *self;
        let mut tables = store.tables.write().await;

        for staged_booking in staged.bookings.values() {
            let Some(read_version) = staged_booking.read_version else {
                continue;
            };
            let booking_id = staged_booking.booking.id;
            let actual = tables
                .bookings
                .get(&booking_id)
                .map(|b| b.version)
                .ok_or_else(|| StoreError::RowNotFound(format!("booking {booking_id}")))?;
            if actual != read_version {
                return Err(StoreError::ConcurrencyConflict {
                    booking_id,
                    expected: read_version,
                    actual,
                });
            }
        }
        for user in staged.users.values() {
            if tables.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::UniqueViolation(format!("email {}", user.email)));
            }
        }

        tables.units.extend(staged.units);
        tables.users.extend(staged.users);
        tables
            .bookings
            .extend(staged.bookings.into_iter().map(|(id, s)| (id, s.booking)));
        tables.payments.extend(staged.payments);
        tables.events.extend(staged.events);

        drop(tables);
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}
