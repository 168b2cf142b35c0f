//! Unit catalog: creation, search and event history.

mod service;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use store::{Money, SortDirection, UnitId, UnitSortField, UnitType};

pub use service::UnitService;

/// Event detail recorded when a unit is added to the catalog.
pub const CREATED_DETAILS: &str = "Unit created";

/// Command to add a unit to the catalog.
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub rooms: i32,
    pub unit_type: UnitType,
    pub floor: i32,
    pub description: String,
    pub base_cost: Money,
}

/// Catalog search criteria.
///
/// Cost bounds are final prices, markup included. The date filter is only
/// applied when both dates are given.
#[derive(Debug, Clone)]
pub struct UnitSearch {
    pub unit_type: Option<UnitType>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub min_cost: Option<Money>,
    pub max_cost: Option<Money>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: u32,
    pub size: u32,
    pub sort_by: UnitSortField,
    pub direction: SortDirection,
}

impl Default for UnitSearch {
    fn default() -> Self {
        Self {
            unit_type: None,
            rooms: None,
            floor: None,
            min_cost: None,
            max_cost: None,
            start_date: None,
            end_date: None,
            page: 0,
            size: 10,
            sort_by: UnitSortField::Id,
            direction: SortDirection::Asc,
        }
    }
}

/// A unit as presented to clients, with its marked-up price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitView {
    pub id: UnitId,
    pub rooms: i32,
    pub unit_type: UnitType,
    pub floor: i32,
    pub description: String,
    pub base_cost: Money,
    pub final_cost: Money,
    pub created_at: DateTime<Utc>,
}
