//! Booking lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use domain::{BookingView, CreateBooking};
use serde::{Deserialize, Serialize};
use store::{BookingId, BookingStatus, PaymentStatus, UnitId, UserId};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_id;

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub unit_id: String,
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub unit_id: String,
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_cost: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<BookingView> for BookingResponse {
    fn from(view: BookingView) -> Self {
        Self {
            id: view.id.to_string(),
            unit_id: view.unit_id.to_string(),
            user_id: view.user_id.to_string(),
            start_date: view.start_date,
            end_date: view.end_date,
            status: view.status,
            payment_status: view.payment_status,
            total_cost: view.total_cost.to_string(),
            expires_at: view.expires_at,
        }
    }
}

/// POST /bookings: reserve a unit pending payment.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let unit_id: UnitId = parse_id(&req.unit_id, "unit_id")?;
    let user_id: UserId = parse_id(&req.user_id, "user_id")?;
    let view = state
        .bookings
        .create_booking(CreateBooking {
            unit_id,
            user_id,
            start_date: req.start_date,
            end_date: req.end_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view.into())))
}

/// POST /bookings/{id}/cancel: cancel a booking.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id: BookingId = parse_id(&id, "booking id")?;
    Ok(Json(state.bookings.cancel_booking(booking_id).await?.into()))
}

/// POST /bookings/{id}/pay: confirm payment within the payment window.
#[tracing::instrument(skip(state))]
pub async fn pay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id: BookingId = parse_id(&id, "booking id")?;
    Ok(Json(state.bookings.confirm_payment(booking_id).await?.into()))
}
