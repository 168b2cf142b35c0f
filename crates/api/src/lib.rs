//! HTTP API server for the unit booking service.
//!
//! Provides REST endpoints for units, users, bookings and availability
//! statistics, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{
    AvailabilityService, BookingPolicy, BookingService, Clock, SystemClock, UnitService,
    UserService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{AvailabilityCounter, BookingStore, InMemoryAvailabilityCounter, InMemoryBookingStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub bookings: BookingService,
    pub units: UnitService,
    pub users: UserService,
    pub availability: AvailabilityService,
}

impl AppState {
    /// Wires the services over the given backends.
    pub fn new(
        store: Arc<dyn BookingStore>,
        counter: Arc<dyn AvailabilityCounter>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        let availability = AvailabilityService::new(store.clone(), counter, clock.clone());
        Self {
            bookings: BookingService::new(
                store.clone(),
                availability.clone(),
                clock.clone(),
                policy,
            ),
            units: UnitService::new(
                store.clone(),
                availability.clone(),
                clock.clone(),
                policy.markup,
            ),
            users: UserService::new(store, clock),
            availability,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users", post(routes::users::create))
        .route("/users/{id}", get(routes::users::get))
        .route(
            "/units",
            post(routes::units::create).get(routes::units::search),
        )
        .route("/units/{id}", get(routes::units::get))
        .route("/units/{id}/events", get(routes::units::events))
        .route("/bookings", post(routes::bookings::create))
        .route("/bookings/{id}/cancel", post(routes::bookings::cancel))
        .route("/bookings/{id}/pay", post(routes::bookings::pay))
        .route("/stats/availability", get(routes::availability::get))
        .route(
            "/stats/availability/refresh",
            post(routes::availability::refresh),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over the in-memory store and counter.
pub fn create_default_state(policy: BookingPolicy) -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(InMemoryBookingStore::new()),
        Arc::new(InMemoryAvailabilityCounter::new()),
        Arc::new(SystemClock),
        policy,
    ))
}
