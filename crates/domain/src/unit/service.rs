use std::sync::Arc;

use store::{
    BookingStore, DateRange, Money, Page, Unit, UnitEvent, UnitEventType, UnitId, UnitQuery,
};
use tracing::{info, warn};

use super::{CREATED_DETAILS, NewUnit, UnitSearch, UnitView};
use crate::availability::AvailabilityService;
use crate::clock::Clock;
use crate::error::{DomainError, Result};
use crate::events::EventRecorder;
use crate::pricing::Markup;

/// Service for the unit catalog.
#[derive(Clone)]
pub struct UnitService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    events: EventRecorder,
    clock: Arc<dyn Clock>,
    markup: Markup,
}

impl UnitService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        availability: AvailabilityService,
        clock: Arc<dyn Clock>,
        markup: Markup,
    ) -> Self {
        Self {
            store,
            availability,
            events: EventRecorder::new(clock.clone()),
            clock,
            markup,
        }
    }

    /// Adds a unit to the catalog. A new unit counts as available today.
    #[tracing::instrument(skip(self, cmd), fields(rooms = cmd.rooms, unit_type = %cmd.unit_type, floor = cmd.floor))]
    pub async fn create_unit(&self, cmd: NewUnit) -> Result<UnitView> {
        validate_new_unit(&cmd)?;
        if self.markup.apply(cmd.base_cost).is_none() {
            return Err(DomainError::invalid("base_cost is too large"));
        }
        info!("Creating unit");

        let unit = Unit {
            id: UnitId::new(),
            rooms: cmd.rooms,
            unit_type: cmd.unit_type,
            floor: cmd.floor,
            description: cmd.description.trim().to_string(),
            base_cost: cmd.base_cost,
            created_at: self.clock.now(),
        };

        // Take the baseline before the new unit is visible to the count.
        if let Err(e) = self.availability.initialize_if_absent().await {
            warn!(error = %e, "Availability counter could not be initialized");
        }

        let mut tx = self.store.begin().await?;
        tx.insert_unit(&unit).await?;
        self.events
            .record(tx.as_mut(), unit.id, UnitEventType::Created, CREATED_DETAILS)
            .await?;
        tx.commit().await?;

        if let Err(e) = self.availability.increase().await {
            warn!(error = %e, "Availability counter not increased after unit creation");
        }

        info!(unit_id = %unit.id, "Unit created");
        self.to_view(unit)
    }

    /// Searches the catalog.
    #[tracing::instrument(skip(self))]
    pub async fn search_units(&self, search: UnitSearch) -> Result<Page<UnitView>> {
        let query = self.to_query(&search)?;
        let page = self.store.search_units(&query).await?;
        info!(
            total = page.total_elements,
            page = page.page,
            size = page.size,
            "Search completed"
        );
        page.try_map(|unit| self.to_view(unit))
    }

    /// Loads a unit by ID.
    pub async fn get_unit(&self, unit_id: UnitId) -> Result<UnitView> {
        self.store
            .find_unit(unit_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Unit not found"))
            .and_then(|unit| self.to_view(unit))
    }

    /// Returns the event log of an existing unit, oldest first.
    pub async fn events_for_unit(&self, unit_id: UnitId) -> Result<Vec<UnitEvent>> {
        if self.store.find_unit(unit_id).await?.is_none() {
            return Err(DomainError::not_found("Unit not found"));
        }
        Ok(self.store.events_for_unit(unit_id).await?)
    }

    fn to_view(&self, unit: Unit) -> Result<UnitView> {
        let final_cost = self.markup.apply(unit.base_cost).ok_or_else(|| {
            DomainError::invalid(format!("final cost of unit {} is out of range", unit.id))
        })?;
        Ok(UnitView {
            id: unit.id,
            rooms: unit.rooms,
            unit_type: unit.unit_type,
            floor: unit.floor,
            final_cost,
            base_cost: unit.base_cost,
            description: unit.description,
            created_at: unit.created_at,
        })
    }

    /// Validates search criteria and converts final-price bounds to base cost.
    fn to_query(&self, search: &UnitSearch) -> Result<UnitQuery> {
        if search.rooms.is_some_and(|rooms| rooms <= 0) {
            return Err(DomainError::invalid("rooms must be positive"));
        }
        for cost in [search.min_cost, search.max_cost].into_iter().flatten() {
            if !cost.is_positive() {
                return Err(DomainError::invalid("cost bounds must be positive"));
            }
        }
        if let (Some(min), Some(max)) = (search.min_cost, search.max_cost)
            && max < min
        {
            return Err(DomainError::invalid(
                "max_cost must be greater than or equal to min_cost",
            ));
        }

        let base_cost = |cost: Option<Money>| {
            cost.map(|cost| {
                self.markup
                    .remove(cost)
                    .ok_or_else(|| DomainError::invalid("cost bounds are too large"))
            })
            .transpose()
        };
        let mut query = UnitQuery::new()
            .base_cost_between(base_cost(search.min_cost)?, base_cost(search.max_cost)?)
            .page(search.page, if search.size == 0 { 10 } else { search.size })
            .sort(search.sort_by, search.direction);
        query.unit_type = search.unit_type;
        query.rooms = search.rooms;
        query.floor = search.floor;

        if let (Some(start), Some(end)) = (search.start_date, search.end_date) {
            let range = DateRange::new(start, end).ok_or_else(|| {
                DomainError::invalid("end_date must be on or after start_date")
            })?;
            query = query.available_during(range);
        }
        Ok(query)
    }
}

fn validate_new_unit(cmd: &NewUnit) -> Result<()> {
    if cmd.rooms <= 0 {
        return Err(DomainError::invalid("rooms must be positive"));
    }
    if cmd.floor < 0 {
        return Err(DomainError::invalid("floor must not be negative"));
    }
    if cmd.description.trim().is_empty() {
        return Err(DomainError::invalid("description must not be blank"));
    }
    if !cmd.base_cost.is_positive() {
        return Err(DomainError::invalid("base_cost must be positive"));
    }
    Ok(())
}
