use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Booking, BookingId, DateRange, EventId, Money, Page, Payment, PaymentId, Result, StoreError,
    Unit, UnitEvent, UnitId, UnitQuery, User, UserId, Version,
    store::{BookingStore, StoreTransaction},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const UNIT_COLUMNS: &str = "id, rooms, unit_type, floor, description, base_cost_cents, created_at";
const BOOKING_COLUMNS: &str = "id, unit_id, user_id, start_date, end_date, status, total_cost_cents, expires_at, created_at, updated_at, version";
const PAYMENT_COLUMNS: &str = "id, booking_id, status, paid_at, created_at";

/// PostgreSQL-backed booking store.
///
/// Row locks are `SELECT ... FOR UPDATE`; every transaction sets a local
/// `lock_timeout` so lock waits are bounded.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a store whose transactions give up waiting for a row lock
    /// after `lock_timeout`.
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

/// Translates lock timeouts and unique violations into store errors.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some("55P03") => return StoreError::LockTimeout(db_err.message().to_string()),
            Some("23505") => {
                return StoreError::UniqueViolation(
                    db_err.constraint().unwrap_or("unique constraint").to_string(),
                );
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Decode)
}

fn row_to_unit(row: PgRow) -> Result<Unit> {
    Ok(Unit {
        id: UnitId::from_uuid(row.try_get::<Uuid, _>("id")?),
        rooms: row.try_get("rooms")?,
        unit_type: parse_column(&row, "unit_type")?,
        floor: row.try_get("floor")?,
        description: row.try_get("description")?,
        base_cost: Money::from_cents(row.try_get("base_cost_cents")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_booking(row: PgRow) -> Result<Booking> {
    let id = BookingId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let start: NaiveDate = row.try_get("start_date")?;
    let end: NaiveDate = row.try_get("end_date")?;
    let dates = DateRange::new(start, end)
        .ok_or_else(|| StoreError::Decode(format!("booking {id} ends before it starts")))?;

    Ok(Booking {
        id,
        unit_id: UnitId::from_uuid(row.try_get::<Uuid, _>("unit_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        dates,
        status: parse_column(&row, "status")?,
        total_cost: Money::from_cents(row.try_get("total_cost_cents")?),
        expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        booking_id: BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
        status: parse_column(&row, "status")?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_event(row: PgRow) -> Result<UnitEvent> {
    Ok(UnitEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
        unit_id: UnitId::from_uuid(row.try_get::<Uuid, _>("unit_id")?),
        event_type: parse_column(&row, "event_type")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Appends the WHERE clause of a unit search.
fn push_unit_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UnitQuery) {
    builder.push(" WHERE 1=1");
    if let Some(unit_type) = query.unit_type {
        builder.push(" AND unit_type = ").push_bind(unit_type.as_str());
    }
    if let Some(rooms) = query.rooms {
        builder.push(" AND rooms = ").push_bind(rooms);
    }
    if let Some(floor) = query.floor {
        builder.push(" AND floor = ").push_bind(floor);
    }
    if let Some(min) = query.min_base_cost {
        builder.push(" AND base_cost_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = query.max_base_cost {
        builder.push(" AND base_cost_cents <= ").push_bind(max.cents());
    }
    if let Some(range) = query.available_during {
        builder
            .push(
                " AND NOT EXISTS (SELECT 1 FROM bookings b WHERE b.unit_id = units.id \
                 AND b.status <> 'CANCELLED' AND b.start_date <= ",
            )
            .push_bind(range.end())
            .push(" AND b.end_date >= ")
            .push_bind(range.start())
            .push(")");
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn find_unit(&self, unit_id: UnitId) -> Result<Option<Unit>> {
        let row = sqlx::query(&format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = $1"))
            .bind(unit_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_unit).transpose()
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_user).transpose()
    }

    async fn find_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_booking).transpose()
    }

    async fn find_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1"
        ))
        .bind(booking_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_payment).transpose()
    }

    async fn search_units(&self, query: &UnitQuery) -> Result<Page<Unit>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM units");
        push_unit_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {UNIT_COLUMNS} FROM units"));
        push_unit_filters(&mut select, query);
        select.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            query.sort_by.column(),
            query.direction.keyword()
        ));
        select.push_bind(i64::from(query.size));
        select.push(" OFFSET ").push_bind(query.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let content = rows.into_iter().map(row_to_unit).collect::<Result<Vec<_>>>()?;

        Ok(Page {
            content,
            page: query.page,
            size: query.size,
            total_elements: total.max(0) as u64,
        })
    }

    async fn count_units_available_on(&self, day: NaiveDate) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM units u
            WHERE NOT EXISTS (
                SELECT 1 FROM bookings b
                WHERE b.unit_id = u.id
                  AND b.status <> 'CANCELLED'
                  AND b.start_date <= $1
                  AND b.end_date >= $1
            )
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn events_for_unit(&self, unit_id: UnitId) -> Result<Vec<UnitEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, unit_id, event_type, details, created_at
            FROM unit_events
            WHERE unit_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(unit_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_event).collect()
    }
}

/// Transaction over a [`PostgresBookingStore`].
///
/// Dropping it without committing rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_unit(&mut self, unit_id: UnitId) -> Result<Option<Unit>> {
        let row = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM units WHERE id = $1 FOR UPDATE"
        ))
        .bind(unit_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.map(row_to_unit).transpose()
    }

    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<Booking>> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.map(row_to_booking).transpose()
    }

    async fn lock_expired_bookings(&mut self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        // Under READ COMMITTED, rows updated while we waited are re-evaluated
        // against the WHERE clause before being returned.
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'PENDING_PAYMENT' AND expires_at <= $1 \
             ORDER BY id FOR UPDATE"
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        rows.into_iter().map(row_to_booking).collect()
    }

    async fn exists_active_booking(&mut self, unit_id: UnitId, dates: DateRange) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bookings
                WHERE unit_id = $1
                  AND status <> 'CANCELLED'
                  AND start_date <= $3
                  AND end_date >= $2
            )
            "#,
        )
        .bind(unit_id.as_uuid())
        .bind(dates.start())
        .bind(dates.end())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(exists)
    }

    async fn find_user(&mut self, user_id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_user).transpose()
    }

    async fn find_payment_for_booking(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = $1"
        ))
        .bind(booking_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.map(row_to_payment).transpose()
    }

    async fn insert_unit(&mut self, unit: &Unit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO units (id, rooms, unit_type, floor, description, base_cost_cents, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(unit.id.as_uuid())
        .bind(unit.rooms)
        .bind(unit.unit_type.as_str())
        .bind(unit.floor)
        .bind(&unit.description)
        .bind(unit.base_cost.cents())
        .bind(unit.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, name, email, created_at) VALUES ($1, $2, $3, $4)")
            .bind(user.id.as_uuid())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, unit_id, user_id, start_date, end_date, status,
                                  total_cost_cents, expires_at, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.unit_id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.dates.start())
        .bind(booking.dates.end())
        .bind(booking.status.as_str())
        .bind(booking.total_cost.cents())
        .bind(booking.expires_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, status, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.booking_id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<Booking> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3, total_cost_cents = $4, expires_at = $5, updated_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.version.as_i64())
        .bind(booking.status.as_str())
        .bind(booking.total_cost.cents())
        .bind(booking.expires_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM bookings WHERE id = $1")
                    .bind(booking.id.as_uuid())
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(map_db_error)?;
            return Err(match actual {
                Some(actual) => StoreError::ConcurrencyConflict {
                    booking_id: booking.id,
                    expected: booking.version,
                    actual: Version::new(actual),
                },
                None => StoreError::RowNotFound(format!("booking {}", booking.id)),
            });
        }

        let mut updated = booking.clone();
        updated.version = booking.version.next();
        Ok(updated)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query("UPDATE payments SET status = $2, paid_at = $3 WHERE id = $1")
            .bind(payment.id.as_uuid())
            .bind(payment.status.as_str())
            .bind(payment.paid_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    async fn append_event(&mut self, event: &UnitEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO unit_events (id, unit_id, event_type, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.unit_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgTransaction { tx } = *self;
        tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
