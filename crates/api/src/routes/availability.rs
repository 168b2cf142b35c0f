//! Availability statistics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub available_units: i64,
}

/// GET /stats/availability: cached number of units available today.
#[tracing::instrument(skip(state))]
pub async fn get(State(state): State<Arc<AppState>>) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available_units = state.availability.get_available_units().await?;
    Ok(Json(AvailabilityResponse { available_units }))
}

/// POST /stats/availability/refresh: recompute the counter from the database.
#[tracing::instrument(skip(state))]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available_units = state.availability.refresh_from_database().await?;
    Ok(Json(AvailabilityResponse { available_units }))
}
