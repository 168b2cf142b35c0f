use serde::{Deserialize, Serialize};

use crate::{DateRange, Money, UnitType};

/// Column a unit search can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSortField {
    #[default]
    Id,
    Rooms,
    Floor,
    BaseCost,
    CreatedAt,
}

impl UnitSortField {
    /// Returns the SQL column name for this field.
    pub fn column(&self) -> &'static str {
        match self {
            UnitSortField::Id => "id",
            UnitSortField::Rooms => "rooms",
            UnitSortField::Floor => "floor",
            UnitSortField::BaseCost => "base_cost_cents",
            UnitSortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Builder for unit catalog searches.
///
/// Cost bounds are expressed in base cost (before markup). When
/// `available_during` is set, units with an active booking overlapping that
/// range are excluded.
#[derive(Debug, Clone)]
pub struct UnitQuery {
    pub unit_type: Option<UnitType>,
    pub rooms: Option<i32>,
    pub floor: Option<i32>,
    pub min_base_cost: Option<Money>,
    pub max_base_cost: Option<Money>,
    pub available_during: Option<DateRange>,
    pub page: u32,
    pub size: u32,
    pub sort_by: UnitSortField,
    pub direction: SortDirection,
}

impl Default for UnitQuery {
    fn default() -> Self {
        Self {
            unit_type: None,
            rooms: None,
            floor: None,
            min_base_cost: None,
            max_base_cost: None,
            available_during: None,
            page: 0,
            size: 10,
            sort_by: UnitSortField::Id,
            direction: SortDirection::Asc,
        }
    }
}

impl UnitQuery {
    /// Creates a query matching every unit, first page of ten.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_type(mut self, unit_type: UnitType) -> Self {
        self.unit_type = Some(unit_type);
        self
    }

    pub fn rooms(mut self, rooms: i32) -> Self {
        self.rooms = Some(rooms);
        self
    }

    pub fn floor(mut self, floor: i32) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn base_cost_between(mut self, min: Option<Money>, max: Option<Money>) -> Self {
        self.min_base_cost = min;
        self.max_base_cost = max;
        self
    }

    pub fn available_during(mut self, range: DateRange) -> Self {
        self.available_during = Some(range);
        self
    }

    pub fn page(mut self, page: u32, size: u32) -> Self {
        self.page = page;
        self.size = size;
        self
    }

    pub fn sort(mut self, sort_by: UnitSortField, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    /// Number of rows to skip for the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    /// Converts the page content while keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
        }
    }

    /// Like [`Page::map`], stopping at the first conversion error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<_, E>>()?,
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_ten_sorted_by_id() {
        let query = UnitQuery::new();
        assert_eq!(query.page, 0);
        assert_eq!(query.size, 10);
        assert_eq!(query.sort_by, UnitSortField::Id);
        assert_eq!(query.direction, SortDirection::Asc);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn offset_follows_page_and_size() {
        let query = UnitQuery::new().page(3, 25);
        assert_eq!(query.offset(), 75);
    }

    #[test]
    fn page_map_keeps_metadata() {
        let page = Page {
            content: vec![1, 2, 3],
            page: 1,
            size: 3,
            total_elements: 6,
        };
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.content, vec![10, 20, 30]);
        assert_eq!(mapped.total_elements, 6);
    }

    #[test]
    fn page_try_map_stops_at_first_error() {
        let page = Page {
            content: vec![1, -2, 3],
            page: 0,
            size: 3,
            total_elements: 3,
        };
        let mapped: Result<Page<u32>, i32> =
            page.try_map(|n| u32::try_from(n).map_err(|_| n));
        assert_eq!(mapped.err(), Some(-2));
    }
}
