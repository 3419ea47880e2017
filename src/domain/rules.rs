//! Rule engine - pure category rules
//!
//! Two families of checks live here:
//! - sensor compliance: does a reading break any rule of an item's categories
//! - co-location: may two category sets share a truck
//!
//! Plus the temperature admissibility rules used when placing items in
//! facilities and when a truck unloads into a warehouse.
//!
//! A sensor check only fails when the reading's metric is the one the
//! check watches AND the value is out of bounds. Readings for unrelated
//! metrics always pass. The use-by check is the exception: it is derived
//! from the reading's time, so every reading can trip it.

use crate::domain::category::{Category, CategorySet, TempBand};
use crate::domain::temperature::{Climate, TemperatureRange};
use crate::domain::types::{Metric, SensorReading, Tick};
use serde::Serialize;
use smallvec::SmallVec;

/// Humidity above this is wet (%)
pub const MAX_DRY_HUMIDITY: f64 = 60.0;
/// Illuminance above this is light (lux)
pub const MAX_DARK_ILLUMINANCE: f64 = 500.0;
/// Acceleration at or above this breaks fragile goods (g)
pub const MAX_FRAGILE_ACCELERATION: f64 = 5.0;
/// Vibration displacement at or above this breaks fragile goods
pub const MAX_FRAGILE_DISPLACEMENT: f64 = 10.0;
/// Vibration velocity at or above this breaks fragile goods
pub const MAX_FRAGILE_VELOCITY: f64 = 100.0;

/// Composite per-category sensor rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    Fragile,
    Medicinal,
    Perishable,
    Edible,
    Dry,
    Temp,
}

/// Violated rules for one reading, in evaluation order
pub type Violations = SmallVec<[Rule; 4]>;

impl Rule {
    /// Evaluation (and reporting) order
    pub const ALL: [Rule; 6] =
        [Rule::Fragile, Rule::Medicinal, Rule::Perishable, Rule::Edible, Rule::Dry, Rule::Temp];

    pub fn as_str(self) -> &'static str {
        match self {
            Rule::Fragile => "fragile",
            Rule::Medicinal => "medicinal",
            Rule::Perishable => "perishable",
            Rule::Edible => "edible",
            Rule::Dry => "dry",
            Rule::Temp => "temp",
        }
    }

    /// Whether an item with these categories is bound by this rule
    pub fn applies_to(self, categories: CategorySet) -> bool {
        match self {
            Rule::Fragile => categories.contains(Category::Fragile),
            Rule::Medicinal => categories.contains(Category::Medicinal),
            Rule::Perishable => categories.contains(Category::Perishable),
            Rule::Edible => categories.contains(Category::Edible),
            Rule::Dry => categories.contains(Category::Dry),
            Rule::Temp => categories.band().is_some(),
        }
    }

    /// Whether the reading satisfies this rule for the given item attributes
    pub fn holds(self, reading: &SensorReading, categories: CategorySet, use_by: Option<Tick>) -> bool {
        match self {
            Rule::Fragile => low_g(reading) && smooth_ride(reading),
            Rule::Medicinal => dry(reading) && dark(reading),
            Rule::Perishable => dry(reading) && dark(reading) && within_use_by(reading, use_by),
            Rule::Edible | Rule::Dry => dry(reading),
            Rule::Temp => temperature_in_band(reading, categories.band()),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn dry(reading: &SensorReading) -> bool {
    !(reading.metric == Metric::Humidity && reading.value > MAX_DRY_HUMIDITY)
}

#[inline]
fn dark(reading: &SensorReading) -> bool {
    !(reading.metric == Metric::Illuminance && reading.value > MAX_DARK_ILLUMINANCE)
}

#[inline]
fn within_use_by(reading: &SensorReading, use_by: Option<Tick>) -> bool {
    use_by.map_or(true, |limit| reading.tick < limit)
}

#[inline]
fn low_g(reading: &SensorReading) -> bool {
    !(reading.metric == Metric::Acceleration && reading.value >= MAX_FRAGILE_ACCELERATION)
}

#[inline]
fn smooth_ride(reading: &SensorReading) -> bool {
    !(reading.metric == Metric::VibrationDisplacement && reading.value >= MAX_FRAGILE_DISPLACEMENT
        || reading.metric == Metric::VibrationVelocity && reading.value >= MAX_FRAGILE_VELOCITY)
}

#[inline]
fn temperature_in_band(reading: &SensorReading, band: Option<TempBand>) -> bool {
    reading.metric != Metric::Temp || TemperatureRange::for_band(band).contains(reading.value)
}

/// Rules of `categories` the reading breaks, empty if compliant
pub fn violated_rules(
    reading: &SensorReading,
    categories: CategorySet,
    use_by: Option<Tick>,
) -> Violations {
    Rule::ALL
        .into_iter()
        .filter(|rule| rule.applies_to(categories) && !rule.holds(reading, categories, use_by))
        .collect()
}

/// Conjunction of every applicable rule
pub fn is_compliant(reading: &SensorReading, categories: CategorySet, use_by: Option<Tick>) -> bool {
    Rule::ALL
        .into_iter()
        .filter(|rule| rule.applies_to(categories))
        .all(|rule| rule.holds(reading, categories, use_by))
}

/// Whether two category sets must not share a truck. Symmetric.
pub fn incompatible(a: CategorySet, b: CategorySet) -> bool {
    use Category::*;
    let has = |set: CategorySet, c: Category| set.contains(c);

    has(a, Fragile) && has(b, Bulky)
        || has(a, Bulky) && has(b, Fragile)
        || has(a, Hazardous) && (has(b, Edible) || has(b, Medicinal))
        || (has(a, Edible) || has(a, Medicinal)) && has(b, Hazardous)
        || has(a, Edible) && has(b, Medicinal)
        || has(a, Medicinal) && has(b, Edible)
        || has(a, Hazardous) && has(b, Hazardous)
}

#[inline]
pub fn compatible(a: CategorySet, b: CategorySet) -> bool {
    !incompatible(a, b)
}

/// Whether an item with `band` may be stored in or carried by a facility
/// with the given climate.
///
/// Banded items need a controlled facility of the same band. Ambient goods
/// accept any controlled band except frozen. Unbanded items go anywhere.
pub fn temperature_admissible(band: Option<TempBand>, climate: Climate) -> bool {
    let Some(band) = band else {
        return true;
    };
    match climate {
        Climate::Uncontrolled => false,
        Climate::Controlled(facility_band) if band == TempBand::Ambient => {
            facility_band != TempBand::Frozen
        }
        Climate::Controlled(facility_band) => facility_band == band,
    }
}

/// Whether a truck with climate `truck` may unload into a facility with
/// climate `destination`.
///
/// Uncontrolled trucks unload anywhere; identical climates always match;
/// an ambient truck unloads into any controlled band except frozen.
pub fn can_unload(truck: Climate, destination: Climate) -> bool {
    match (truck, destination) {
        (Climate::Uncontrolled, _) => true,
        (t, d) if t == d => true,
        (Climate::Controlled(TempBand::Ambient), Climate::Controlled(band)) => band != TempBand::Frozen,
        _ => false,
    }
}
