//! Records emitted by the core for observers
//!
//! Every rule violation, inconsistency and setup fallback becomes a
//! `ViolationRecord`; movements and truck relocations have their own
//! records. These are data, the core never prints them.

use crate::domain::category::{CategorySet, TempBand};
use crate::domain::item::Item;
use crate::domain::rules::Violations;
use crate::domain::rules::Rule;
use crate::domain::types::{FacilityId, ItemTag, Metric, SensorReading, Tick};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Error taxonomy of the core. None of these abort a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Expected outcome of a sensor or co-location check
    RuleViolation,
    /// Registry disagreed with a requested transition; transition completed anyway
    InconsistentState,
    /// Setup could not satisfy a rule and used its fallback
    Configuration,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::RuleViolation => "rule_violation",
            ViolationKind::InconsistentState => "inconsistent_state",
            ViolationKind::Configuration => "configuration",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationDetail {
    /// A reading broke one or more category rules
    Sensor { metric: Metric, value: f64, rules: Vec<Rule>, categories: CategorySet },
    /// An item already aboard objects to a newly loaded item
    Colocation { loaded: ItemTag, loaded_categories: CategorySet, categories: CategorySet },
    /// Load preconditions failed; `enforced` tells whether the load was refused
    LoadCheckFailed {
        categories: CategorySet,
        truck_aggregate: CategorySet,
        colocation_ok: bool,
        temperature_ok: bool,
        enforced: bool,
    },
    /// Item was not subscribed where the transition expected it
    MissingSubscription { expected: FacilityId, actual: Option<FacilityId> },
    /// No warehouse could take the item's temperature band at setup
    NoAdmissibleWarehouse { band: Option<TempBand>, fallback: FacilityId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationRecord {
    pub tick: Tick,
    pub kind: ViolationKind,
    pub item: ItemTag,
    pub location: FacilityId,
    pub detail: ViolationDetail,
}

impl ViolationRecord {
    fn new(tick: Tick, item: ItemTag, location: FacilityId, detail: ViolationDetail) -> Self {
        let kind = match detail {
            ViolationDetail::Sensor { .. }
            | ViolationDetail::Colocation { .. }
            | ViolationDetail::LoadCheckFailed { .. } => ViolationKind::RuleViolation,
            ViolationDetail::MissingSubscription { .. } => ViolationKind::InconsistentState,
            ViolationDetail::NoAdmissibleWarehouse { .. } => ViolationKind::Configuration,
        };
        Self { tick, kind, item, location, detail }
    }

    pub fn sensor(reading: &SensorReading, item: &Item, rules: Violations) -> Self {
        Self::new(
            reading.tick,
            item.tag(),
            reading.location,
            ViolationDetail::Sensor {
                metric: reading.metric,
                value: reading.value,
                rules: rules.into_vec(),
                categories: item.categories(),
            },
        )
    }

    pub fn colocation(tick: Tick, holder: &Item, location: FacilityId, loaded: &Item) -> Self {
        Self::new(
            tick,
            holder.tag(),
            location,
            ViolationDetail::Colocation {
                loaded: loaded.tag(),
                loaded_categories: loaded.categories(),
                categories: holder.categories(),
            },
        )
    }

    pub fn load_check_failed(
        tick: Tick,
        item: &Item,
        truck: FacilityId,
        truck_aggregate: CategorySet,
        check: LoadCheck,
    ) -> Self {
        Self::new(
            tick,
            item.tag(),
            truck,
            ViolationDetail::LoadCheckFailed {
                categories: item.categories(),
                truck_aggregate,
                colocation_ok: check.colocation_ok,
                temperature_ok: check.temperature_ok,
                enforced: check.enforced_reject,
            },
        )
    }

    pub fn missing_subscription(
        tick: Tick,
        item: ItemTag,
        expected: FacilityId,
        actual: Option<FacilityId>,
    ) -> Self {
        Self::new(tick, item, expected, ViolationDetail::MissingSubscription { expected, actual })
    }

    pub fn no_admissible_warehouse(item: &Item, fallback: FacilityId) -> Self {
        Self::new(
            Tick::default(),
            item.tag(),
            fallback,
            ViolationDetail::NoAdmissibleWarehouse { band: item.categories().band(), fallback },
        )
    }

    /// Violated rule names for sensor records, empty otherwise
    pub fn rules(&self) -> &[Rule] {
        match &self.detail {
            ViolationDetail::Sensor { rules, .. } => rules,
            _ => &[],
        }
    }
}

/// Outcome of a load's precondition checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadCheck {
    pub colocation_ok: bool,
    pub temperature_ok: bool,
    /// Checks failed and the active policy enforces the failing rule
    pub enforced_reject: bool,
}

impl LoadCheck {
    /// Both checks passed
    #[inline]
    pub fn passed(&self) -> bool {
        self.colocation_ok && self.temperature_ok
    }
}

/// A truck moving to a new warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelocationRecord {
    pub tick: Tick,
    pub truck: FacilityId,
    pub from: FacilityId,
    pub to: FacilityId,
    /// No candidate passed the temperature filter; first candidate taken
    pub fallback: bool,
}
