//! Unit catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use domain::{NewUnit, UnitSearch, UnitView};
use serde::{Deserialize, Serialize};
use store::{Page, SortDirection, UnitEvent, UnitId, UnitSortField, UnitType};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::{AmountInput, parse_id, parse_money};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateUnitRequest {
    pub rooms: i32,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub floor: i32,
    pub description: String,
    pub base_cost: AmountInput,
}

/// Query string of `GET /units`. Cost bounds are final prices.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "type")]
    pub unit_type: Option<UnitType>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub min_cost: Option<String>,
    pub max_cost: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_by: Option<UnitSortField>,
    pub direction: Option<SortDirection>,
}

impl SearchParams {
    fn into_search(self) -> Result<UnitSearch, ApiError> {
        let defaults = UnitSearch::default();
        Ok(UnitSearch {
            unit_type: self.unit_type,
            rooms: self.rooms,
            floor: self.floor,
            min_cost: self
                .min_cost
                .as_deref()
                .map(|raw| parse_money(raw, "min_cost"))
                .transpose()?,
            max_cost: self
                .max_cost
                .as_deref()
                .map(|raw| parse_money(raw, "max_cost"))
                .transpose()?,
            start_date: self.start_date,
            end_date: self.end_date,
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
            sort_by: self.sort_by.unwrap_or(defaults.sort_by),
            direction: self.direction.unwrap_or(defaults.direction),
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct UnitResponse {
    pub id: String,
    pub rooms: i32,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub floor: i32,
    pub description: String,
    pub base_cost: String,
    pub final_cost: String,
    pub created_at: DateTime<Utc>,
}

impl From<UnitView> for UnitResponse {
    fn from(unit: UnitView) -> Self {
        Self {
            id: unit.id.to_string(),
            rooms: unit.rooms,
            unit_type: unit.unit_type,
            floor: unit.floor,
            description: unit.description,
            base_cost: unit.base_cost.to_string(),
            final_cost: unit.final_cost.to_string(),
            created_at: unit.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct UnitEventResponse {
    pub id: String,
    pub unit_id: String,
    pub event_type: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl From<UnitEvent> for UnitEventResponse {
    fn from(event: UnitEvent) -> Self {
        Self {
            id: event.id.to_string(),
            unit_id: event.unit_id.to_string(),
            event_type: event.event_type.to_string(),
            details: event.details,
            created_at: event.created_at,
        }
    }
}

// -- Handlers --

/// POST /units: add a unit to the catalog.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUnitRequest>,
) -> Result<(StatusCode, Json<UnitResponse>), ApiError> {
    let base_cost = req.base_cost.to_money("base_cost")?;
    let unit = state
        .units
        .create_unit(NewUnit {
            rooms: req.rooms,
            unit_type: req.unit_type,
            floor: req.floor,
            description: req.description,
            base_cost,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(unit.into())))
}

/// GET /units: search the catalog.
#[tracing::instrument(skip(state))]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<UnitResponse>>, ApiError> {
    let page = state.units.search_units(params.into_search()?).await?;
    Ok(Json(page.map(UnitResponse::from)))
}

/// GET /units/{id}: load one unit.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UnitResponse>, ApiError> {
    let unit_id: UnitId = parse_id(&id, "unit id")?;
    Ok(Json(state.units.get_unit(unit_id).await?.into()))
}

/// GET /units/{id}/events: the unit's event log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UnitEventResponse>>, ApiError> {
    let unit_id: UnitId = parse_id(&id, "unit id")?;
    let events = state.units.events_for_unit(unit_id).await?;
    Ok(Json(events.into_iter().map(UnitEventResponse::from).collect()))
}
