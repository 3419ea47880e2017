//! Items (goods) carried through the network
//!
//! An item's categories are fixed at construction. Where it currently is
//! lives in the channel registry, not here.

use crate::domain::category::{Category, CategorySet};
use crate::domain::facility::Facility;
use crate::domain::rules::{self, Violations};
use crate::domain::types::{ItemTag, SensorReading, Tick};

/// Any dimension above this makes a heavy item bulky (cm)
const BULKY_DIMENSION_CM: u64 = 100;
/// Volume above this makes a heavy item bulky (cm³)
const BULKY_VOLUME_CM3: u64 = 50 * 50 * 50;
/// Weight from which an item can be bulky (kg)
const BULKY_WEIGHT_KG: f64 = 100.0;

/// Physical attributes, only used to derive the Bulky flag
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Physical {
    pub weight_kg: f64,
    pub quantity: u64,
    pub height_cm: u64,
    pub width_cm: u64,
    pub breadth_cm: u64,
}

impl Physical {
    pub fn volume_cm3(&self) -> u64 {
        self.height_cm.saturating_mul(self.width_cm).saturating_mul(self.breadth_cm)
    }

    pub fn is_bulky(&self) -> bool {
        let oversized = self.height_cm > BULKY_DIMENSION_CM
            || self.width_cm > BULKY_DIMENSION_CM
            || self.breadth_cm > BULKY_DIMENSION_CM
            || self.volume_cm3() > BULKY_VOLUME_CM3;
        oversized && self.weight_kg >= BULKY_WEIGHT_KG
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    tag: ItemTag,
    categories: CategorySet,
    use_by: Option<Tick>,
    physical: Physical,
}

impl Item {
    pub fn new(tag: ItemTag, categories: CategorySet) -> Self {
        Self { tag, categories, use_by: None, physical: Physical::default() }
    }

    /// Build an item from its physical attributes; Bulky is derived, any
    /// Bulky flag already in `categories` is kept.
    pub fn with_physical(tag: ItemTag, categories: CategorySet, physical: Physical) -> Self {
        let categories =
            if physical.is_bulky() { categories.with(Category::Bulky) } else { categories };
        Self { tag, categories, use_by: None, physical }
    }

    /// Attach a use-by time. Ignored unless the item is Perishable.
    #[must_use]
    pub fn with_use_by(mut self, use_by: Tick) -> Self {
        if self.categories.contains(Category::Perishable) {
            self.use_by = Some(use_by);
        }
        self
    }

    #[inline]
    pub fn tag(&self) -> ItemTag {
        self.tag
    }

    #[inline]
    pub fn categories(&self) -> CategorySet {
        self.categories
    }

    pub fn use_by(&self) -> Option<Tick> {
        self.use_by
    }

    pub fn physical(&self) -> &Physical {
        &self.physical
    }

    /// Names of the rules this reading breaks for this item (empty if none)
    pub fn evaluate_sensor(&self, reading: &SensorReading) -> Violations {
        rules::violated_rules(reading, self.categories, self.use_by)
    }

    pub fn is_sensor_compliant(&self, reading: &SensorReading) -> bool {
        rules::is_compliant(reading, self.categories, self.use_by)
    }

    /// Whether this item may join a truck already carrying `aggregate`
    pub fn is_compatible_with_truck_load(&self, aggregate: CategorySet) -> bool {
        rules::compatible(self.categories, aggregate)
    }

    /// Whether this item may share a truck with `other`
    pub fn is_compatible_with(&self, other: &Item) -> bool {
        rules::compatible(self.categories, other.categories)
    }

    /// Temperature admissibility at a warehouse or truck
    pub fn admissible_at(&self, facility: &Facility) -> bool {
        rules::temperature_admissible(self.categories.band(), facility.climate())
    }
}
