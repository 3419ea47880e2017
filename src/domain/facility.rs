//! Warehouses and trucks

use crate::domain::category::CategorySet;
use crate::domain::item::Item;
use crate::domain::rules;
use crate::domain::temperature::Climate;
use crate::domain::types::{FacilityId, FacilityKind};

/// A location goods can be at
#[derive(Debug, Clone)]
pub struct Facility {
    id: FacilityId,
    kind: FacilityKind,
    climate: Climate,
    /// Grid position (warehouses only)
    position: Option<(u32, u32)>,
    /// OR of non-temperature categories currently aboard (trucks only)
    aggregate: CategorySet,
}

impl Facility {
    pub fn warehouse(id: FacilityId, climate: Climate) -> Self {
        Self { id, kind: FacilityKind::Warehouse, climate, position: None, aggregate: CategorySet::EMPTY }
    }

    pub fn warehouse_at(id: FacilityId, climate: Climate, x: u32, y: u32) -> Self {
        Self { position: Some((x, y)), ..Self::warehouse(id, climate) }
    }

    pub fn truck(id: FacilityId, climate: Climate) -> Self {
        Self { id, kind: FacilityKind::Truck, climate, position: None, aggregate: CategorySet::EMPTY }
    }

    #[inline]
    pub fn id(&self) -> FacilityId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> FacilityKind {
        self.kind
    }

    #[inline]
    pub fn is_truck(&self) -> bool {
        self.kind == FacilityKind::Truck
    }

    #[inline]
    pub fn climate(&self) -> Climate {
        self.climate
    }

    pub fn position(&self) -> Option<(u32, u32)> {
        self.position
    }

    /// Categories aboard; always empty for warehouses
    #[inline]
    pub fn aggregate(&self) -> CategorySet {
        self.aggregate
    }

    /// Fold an arriving item's categories into the aggregate (trucks only)
    pub fn register_arrival(&mut self, item: &Item) {
        if self.is_truck() {
            self.aggregate = self.aggregate.merge_flags(item.categories());
        }
    }

    pub fn reset_aggregate(&mut self) {
        self.aggregate = CategorySet::EMPTY;
    }

    /// Whether a truck with `truck_climate` may unload here
    pub fn can_receive_from_truck(&self, truck_climate: Climate) -> bool {
        rules::can_unload(truck_climate, self.climate)
    }
}
