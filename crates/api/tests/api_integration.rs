//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use domain::{BookingPolicy, Clock, ManualClock};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryAvailabilityCounter, InMemoryBookingStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
        ));
        let state = Arc::new(api::AppState::new(
            Arc::new(InMemoryBookingStore::new()),
            Arc::new(InMemoryAvailabilityCounter::new()),
            clock.clone(),
            BookingPolicy::default(),
        ));
        let app = api::create_app(state, get_metrics_handle());
        Self { app, clock }
    }

    fn day(&self, offset: i64) -> NaiveDate {
        self.clock.today() + Duration::days(offset)
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn create_unit(&self, base_cost: Value) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/units",
                Some(json!({
                    "rooms": 2,
                    "type": "FLAT",
                    "floor": 3,
                    "description": "Two rooms near the park",
                    "base_cost": base_cost
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_user(&self, email: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/users",
                Some(json!({ "name": "Guest", "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn book(&self, unit_id: &str, user_id: &str, from: i64, to: i64) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/bookings",
            Some(json!({
                "unit_id": unit_id,
                "user_id": user_id,
                "start_date": self.day(from),
                "end_date": self.day(to)
            })),
        )
        .await
    }

    async fn available_units(&self) -> i64 {
        let (status, body) = self.send("GET", "/stats/availability", None).await;
        assert_eq!(status, StatusCode::OK);
        body["available_units"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_unit_shows_final_cost() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/units",
            Some(json!({
                "rooms": 1,
                "type": "HOME",
                "floor": 0,
                "description": "Cottage",
                "base_cost": "100.00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["base_cost"], "100.00");
    assert_eq!(body["final_cost"], "115.00");
    assert_eq!(body["type"], "HOME");
}

#[tokio::test]
async fn test_create_unit_rejects_invalid_input() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/units",
            Some(json!({
                "rooms": 0,
                "type": "FLAT",
                "floor": 1,
                "description": "Nothing",
                "base_cost": 50
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["error"], "Bad Request");
    assert!(body["timestamp"].is_string());

    let (status, _) = app
        .send(
            "POST",
            "/units",
            Some(json!({
                "rooms": 1,
                "type": "FLAT",
                "floor": 1,
                "description": "Bad price",
                "base_cost": "ten"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_unit_rejects_cost_beyond_markup_range() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/units",
            Some(json!({
                "rooms": 1,
                "type": "FLAT",
                "floor": 1,
                "description": "Penthouse",
                "base_cost": "90000000000000000.00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "base_cost is too large");

    let (_, page) = app.send("GET", "/units", None).await;
    assert_eq!(page["total_elements"], 0);
}

#[tokio::test]
async fn test_booking_lifecycle_create_and_pay() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(100)).await;
    let user_id = app.create_user("payer@example.com").await;

    let (status, booking) = app.book(&unit_id, &user_id, 1, 3).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "PENDING_PAYMENT");
    assert_eq!(booking["payment_status"], "PENDING");
    assert_eq!(booking["total_cost"], "115.00");

    let booking_id = booking["id"].as_str().unwrap();
    let (status, paid) = app
        .send("POST", &format!("/bookings/{booking_id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "CONFIRMED");
    assert_eq!(paid["payment_status"], "PAID");

    let (status, events) = app
        .send("GET", &format!("/units/{unit_id}/events"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["CREATED", "BOOKED", "PAYMENT_CONFIRMED"]);
}

#[tokio::test]
async fn test_overlapping_booking_is_conflict() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(80)).await;
    let user_id = app.create_user("overlap@example.com").await;

    let (status, _) = app.book(&unit_id, &user_id, 0, 2).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.book(&unit_id, &user_id, 2, 4).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Unit is unavailable for the selected dates");
}

#[tokio::test]
async fn test_booking_with_unknown_references() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(80)).await;
    let missing = "00000000-0000-0000-0000-000000000000";

    let (status, body) = app.book(&unit_id, missing, 0, 0).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    let (status, _) = app.book("not-a-uuid", missing, 0, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("POST", &format!("/bookings/{missing}/cancel"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_end_before_start_is_bad_request() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(80)).await;
    let user_id = app.create_user("dates@example.com").await;

    let (status, _) = app.book(&unit_id, &user_id, 3, 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_restores_availability() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(100)).await;
    app.create_unit(json!(100)).await;
    let user_id = app.create_user("cancel@example.com").await;
    assert_eq!(app.available_units().await, 2);

    let (_, booking) = app.book(&unit_id, &user_id, 0, 1).await;
    assert_eq!(app.available_units().await, 1);

    let booking_id = booking["id"].as_str().unwrap();
    let uri = format!("/bookings/{booking_id}/cancel");
    let (status, first) = app.send("POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "CANCELLED");
    assert_eq!(first["payment_status"], "CANCELLED");
    assert_eq!(app.available_units().await, 2);

    let (status, second) = app.send("POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
    assert_eq!(app.available_units().await, 2);
}

#[tokio::test]
async fn test_pay_after_window_is_conflict() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(100)).await;
    let user_id = app.create_user("late@example.com").await;
    let (_, booking) = app.book(&unit_id, &user_id, 5, 6).await;
    let booking_id = booking["id"].as_str().unwrap();

    app.clock.advance(Duration::minutes(16));
    let (status, body) = app
        .send("POST", &format!("/bookings/{booking_id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Payment window has expired");
}

#[tokio::test]
async fn test_pay_cancelled_booking_is_conflict() {
    let app = TestApp::new();
    let unit_id = app.create_unit(json!(100)).await;
    let user_id = app.create_user("cancelled@example.com").await;
    let (_, booking) = app.book(&unit_id, &user_id, 5, 6).await;
    let booking_id = booking["id"].as_str().unwrap();

    app.send("POST", &format!("/bookings/{booking_id}/cancel"), None)
        .await;
    let (status, body) = app
        .send("POST", &format!("/bookings/{booking_id}/pay"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot pay for cancelled booking");
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new();
    app.create_user("twice@example.com").await;
    let (status, _) = app
        .send(
            "POST",
            "/users",
            Some(json!({ "name": "Again", "email": "Twice@Example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_search_units_by_final_price_and_dates() {
    let app = TestApp::new();
    let cheap = app.create_unit(json!(100)).await;
    let booked = app.create_unit(json!(100)).await;
    app.create_unit(json!(300)).await;
    let user_id = app.create_user("search@example.com").await;
    app.book(&booked, &user_id, 1, 2).await;

    let (status, page) = app
        .send("GET", "/units?min_cost=100&max_cost=115.00", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_elements"], 2);

    let uri = format!(
        "/units?max_cost=115&start_date={}&end_date={}",
        app.day(2),
        app.day(3)
    );
    let (status, page) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_elements"], 1);
    assert_eq!(page["content"][0]["id"], cheap.as_str());
}

#[tokio::test]
async fn test_search_units_paging_and_validation() {
    let app = TestApp::new();
    for _ in 0..3 {
        app.create_unit(json!(100)).await;
    }

    let (status, page) = app
        .send("GET", "/units?page=1&size=2&sort_by=base_cost&direction=desc", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_elements"], 3);
    assert_eq!(page["content"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send("GET", "/units?min_cost=200&max_cost=100", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_availability() {
    let app = TestApp::new();
    app.create_unit(json!(100)).await;
    app.create_unit(json!(100)).await;

    let (status, body) = app
        .send("POST", "/stats/availability/refresh", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available_units"], 2);
}

#[tokio::test]
async fn test_unknown_unit_events_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "GET",
            "/units/00000000-0000-0000-0000-000000000000/events",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Unit not found");
}
