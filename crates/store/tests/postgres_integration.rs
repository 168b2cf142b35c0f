//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Booking, BookingId, BookingStatus, BookingStore, DateRange, Money, Payment, PaymentId,
    PaymentStatus, PostgresBookingStore, SortDirection, StoreError, Unit, UnitEvent,
    UnitEventType, UnitId, UnitQuery, UnitSortField, UnitType, User, UserId, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_booking_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresBookingStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE unit_events, payments, bookings, units, users")
        .execute(&pool)
        .await
        .unwrap();

    PostgresBookingStore::with_lock_timeout(pool, Duration::from_millis(200))
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
}

fn test_unit(rooms: i32, cost: i64) -> Unit {
    Unit {
        id: UnitId::new(),
        rooms,
        unit_type: UnitType::Apartments,
        floor: 1,
        description: "Corner unit".to_string(),
        base_cost: Money::from_major(cost),
        created_at: Utc::now(),
    }
}

fn test_user(email: &str) -> User {
    User {
        id: UserId::new(),
        name: "Guest".to_string(),
        email: email.to_string(),
        created_at: Utc::now(),
    }
}

fn test_booking(unit_id: UnitId, user_id: UserId, from: u32, to: u32) -> Booking {
    let now = Utc::now();
    Booking {
        id: BookingId::new(),
        unit_id,
        user_id,
        dates: DateRange::new(day(from), day(to)).unwrap(),
        status: BookingStatus::PendingPayment,
        total_cost: Money::from_cents(11_500),
        expires_at: Some(now + ChronoDuration::minutes(15)),
        created_at: now,
        updated_at: now,
        version: Version::initial(),
    }
}

async fn seed(store: &PostgresBookingStore) -> (Unit, User) {
    let unit = test_unit(2, 100);
    let user = test_user("guest@example.com");
    let mut tx = store.begin().await.unwrap();
    tx.insert_unit(&unit).await.unwrap();
    tx.insert_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    (unit, user)
}

#[tokio::test]
#[serial]
async fn booking_round_trips_through_the_database() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let booking = test_booking(unit.id, user.id, 1, 3);
    let payment = Payment {
        id: PaymentId::new(),
        booking_id: booking.id,
        status: PaymentStatus::Pending,
        paid_at: None,
        created_at: Utc::now(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_booking(&booking).await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.dates, booking.dates);
    assert_eq!(stored.status, BookingStatus::PendingPayment);
    assert_eq!(stored.total_cost.to_string(), "115.00");

    let stored_payment = store.find_payment_for_booking(booking.id).await.unwrap();
    assert_eq!(stored_payment.map(|p| p.id), Some(payment.id));
}

#[tokio::test]
#[serial]
async fn uncommitted_transaction_is_discarded() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let booking = test_booking(unit.id, user.id, 1, 3);

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(&booking).await.unwrap();
    }

    assert!(store.find_booking(booking.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn overlap_check_includes_touching_ranges_and_skips_cancelled() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let active = test_booking(unit.id, user.id, 1, 2);
    let mut cancelled = test_booking(unit.id, user.id, 10, 12);
    cancelled.status = BookingStatus::Cancelled;

    let mut tx = store.begin().await.unwrap();
    tx.insert_booking(&active).await.unwrap();
    tx.insert_booking(&cancelled).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let touching = DateRange::new(day(2), day(3)).unwrap();
    assert!(tx.exists_active_booking(unit.id, touching).await.unwrap());
    let after = DateRange::new(day(3), day(4)).unwrap();
    assert!(!tx.exists_active_booking(unit.id, after).await.unwrap());
    let over_cancelled = DateRange::new(day(11), day(11)).unwrap();
    assert!(
        !tx.exists_active_booking(unit.id, over_cancelled)
            .await
            .unwrap()
    );
}

#[tokio::test]
#[serial]
async fn unit_lock_blocks_second_transaction() {
    let store = get_test_store().await;
    let (unit, _) = seed(&store).await;

    let mut first = store.begin().await.unwrap();
    first.lock_unit(unit.id).await.unwrap();

    let mut second = store.begin().await.unwrap();
    let result = second.lock_unit(unit.id).await;
    assert!(matches!(result, Err(StoreError::LockTimeout(_))));

    first.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn stale_booking_update_is_rejected() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let booking = test_booking(unit.id, user.id, 1, 3);
    let mut tx = store.begin().await.unwrap();
    tx.insert_booking(&booking).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let mut confirmed = booking.clone();
    confirmed.status = BookingStatus::Confirmed;
    let updated = tx.update_booking(&confirmed).await.unwrap();
    assert_eq!(updated.version, Version::new(1));
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let result = tx.update_booking(&booking).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(1)
    ));
}

#[tokio::test]
#[serial]
async fn duplicate_email_maps_to_unique_violation() {
    let store = get_test_store().await;
    seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let result = tx.insert_user(&test_user("guest@example.com")).await;
    assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
}

#[tokio::test]
#[serial]
async fn expired_lock_returns_only_elapsed_pending_bookings() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let now = Utc::now();

    let mut elapsed = test_booking(unit.id, user.id, 1, 1);
    elapsed.expires_at = Some(now - ChronoDuration::minutes(1));
    let fresh = test_booking(unit.id, user.id, 5, 5);
    let mut confirmed = test_booking(unit.id, user.id, 9, 9);
    confirmed.status = BookingStatus::Confirmed;
    confirmed.expires_at = None;

    let mut tx = store.begin().await.unwrap();
    for booking in [&elapsed, &fresh, &confirmed] {
        tx.insert_booking(booking).await.unwrap();
    }
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let expired = tx.lock_expired_bookings(now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, elapsed.id);
}

#[tokio::test]
#[serial]
async fn counts_units_free_today_and_searches() {
    let store = get_test_store().await;
    let (unit, user) = seed(&store).await;
    let other = test_unit(3, 250);
    let booking = test_booking(unit.id, user.id, 4, 6);

    let mut tx = store.begin().await.unwrap();
    tx.insert_unit(&other).await.unwrap();
    tx.insert_booking(&booking).await.unwrap();
    tx.append_event(&UnitEvent::new(
        unit.id,
        UnitEventType::Booked,
        "Booking created and pending payment",
        Utc::now(),
    ))
    .await
    .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.count_units_available_on(day(5)).await.unwrap(), 1);
    assert_eq!(store.count_units_available_on(day(7)).await.unwrap(), 2);

    let page = store
        .search_units(
            &UnitQuery::new()
                .available_during(DateRange::new(day(6), day(8)).unwrap())
                .sort(UnitSortField::BaseCost, SortDirection::Desc),
        )
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
    assert_eq!(page.content[0].id, other.id);

    let events = store.events_for_unit(unit.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, UnitEventType::Booked);
}
