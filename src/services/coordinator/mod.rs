//! Movement coordination and tick orchestration
//!
//! The Coordinator is the single owner of mutable world state:
//! - the item registry and facility set
//! - channel subscriptions (where each item currently is)
//! - truck docking (which warehouse each truck is at)
//!
//! It exposes the four core operations (`unload`, `load`, `relocate`,
//! `broadcast_sensors`) and `run_tick`, which applies a `TickPlan` in the
//! fixed phase order unload → load → relocate → sensors. Every rule
//! violation comes back as data and is also forwarded to egress.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::facility::Facility;
use crate::domain::item::Item;
use crate::domain::record::{LoadCheck, RelocationRecord, ViolationRecord};
use crate::domain::types::{FacilityId, ItemTag, MovementEvent, Tick};
use crate::infra::config::RulePolicy;
use crate::infra::metrics::Metrics;
use crate::io::EgressSender;
use crate::services::channels::{ChannelError, ChannelRegistry};
use crate::services::sensors::SensorSynth;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Caller errors on the coordinator surface. Rule failures are never
/// reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementError {
    #[error("unknown item {0}")]
    UnknownItem(ItemTag),
    #[error("item {0} already registered")]
    DuplicateItem(ItemTag),
    #[error("unknown facility {0}")]
    UnknownFacility(FacilityId),
    #[error("facility {0} already registered")]
    DuplicateFacility(FacilityId),
    #[error("facility {0} is not a truck")]
    NotATruck(FacilityId),
    #[error("facility {0} is not a warehouse")]
    NotAWarehouse(FacilityId),
    #[error("{item} is not at a warehouse (at {at:?})")]
    NotAtWarehouse { item: ItemTag, at: Option<FacilityId> },
    #[error("{item} is not on a truck (at {at:?})")]
    NotOnTruck { item: ItemTag, at: Option<FacilityId> },
    #[error("truck {truck} is not docked at {warehouse}")]
    NotDocked { truck: FacilityId, warehouse: FacilityId },
    #[error("truck {0} is not docked anywhere")]
    Undocked(FacilityId),
    #[error("no warehouses registered")]
    NoWarehouses,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Clone)]
pub struct UnloadOutcome {
    pub movement: MovementEvent,
    /// The truck held no items afterwards and its aggregate was reset
    pub truck_emptied: bool,
    /// Inconsistent-state records, if the item was not where expected
    pub violations: Vec<ViolationRecord>,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The item is now on the truck
    pub loaded: bool,
    pub check: LoadCheck,
    pub movement: Option<MovementEvent>,
    /// Load check and co-location records
    pub violations: Vec<ViolationRecord>,
}

impl LoadOutcome {
    /// Checks failed; under full enforcement the load would not have happened
    pub fn would_reject(&self) -> bool {
        !self.check.passed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorOutcome {
    pub readings: usize,
    pub violations: Vec<ViolationRecord>,
}

/// What the driver wants to happen in one tick
#[derive(Debug, Clone)]
pub struct TickPlan {
    pub unloads: Vec<ItemTag>,
    pub loads: Vec<(ItemTag, FacilityId)>,
    pub relocations: Vec<FacilityId>,
    pub broadcast_sensors: bool,
}

impl Default for TickPlan {
    fn default() -> Self {
        Self { unloads: Vec::new(), loads: Vec::new(), relocations: Vec::new(), broadcast_sensors: true }
    }
}

/// Everything one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: Tick,
    pub movements: Vec<MovementEvent>,
    pub relocations: Vec<RelocationRecord>,
    pub violations: Vec<ViolationRecord>,
    pub unloads: usize,
    pub loads: usize,
    pub loads_rejected: usize,
    pub loads_would_reject: usize,
    pub readings: usize,
    /// Plan entries refused as caller errors
    pub errors: Vec<MovementError>,
}

impl TickReport {
    fn new(tick: Tick) -> Self {
        Self { tick, ..Self::default() }
    }

    fn skip(&mut self, phase: &'static str, error: MovementError) {
        warn!(tick = %self.tick, phase = %phase, error = %error, "plan_entry_skipped");
        self.errors.push(error);
    }
}

/// Owner of world state and the core transition surface
pub struct Coordinator {
    /// Every item by tag
    pub(crate) items: FxHashMap<ItemTag, Item>,
    /// Every warehouse and truck by id
    pub(crate) facilities: FxHashMap<FacilityId, Facility>,
    /// Warehouses in registration order; the first is the setup fallback
    pub(crate) warehouse_order: Vec<FacilityId>,
    /// Trucks in registration order
    pub(crate) truck_order: Vec<FacilityId>,
    /// truck → warehouse it is docked at
    pub(crate) docked: FxHashMap<FacilityId, FacilityId>,
    /// Per-facility subscriptions
    pub(crate) channels: ChannelRegistry,
    pub(crate) policy: RulePolicy,
    pub(crate) sensors: SensorSynth,
    pub(crate) parallel_sensors: bool,
    /// Relocation target selection
    pub(crate) rng: ChaCha8Rng,
    pub(crate) metrics: Arc<Metrics>,
    /// Record egress (optional)
    pub(crate) egress_sender: Option<EgressSender>,
}

impl Coordinator {
    pub fn new(policy: RulePolicy, metrics: Arc<Metrics>, seed: u64) -> Self {
        Self {
            items: FxHashMap::default(),
            facilities: FxHashMap::default(),
            warehouse_order: Vec::new(),
            truck_order: Vec::new(),
            docked: FxHashMap::default(),
            channels: ChannelRegistry::new(),
            policy,
            sensors: SensorSynth::new(seed.wrapping_add(1), 0.0),
            parallel_sensors: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
            metrics,
            egress_sender: None,
        }
    }

    pub fn with_egress(mut self, sender: EgressSender) -> Self {
        self.egress_sender = Some(sender);
        self
    }

    pub fn with_sensor_synth(mut self, sensors: SensorSynth) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_parallel_sensors(mut self, parallel: bool) -> Self {
        self.parallel_sensors = parallel;
        self
    }

    fn register_facility(&mut self, facility: Facility) -> Result<FacilityId, MovementError> {
        let id = facility.id();
        if self.facilities.contains_key(&id) {
            return Err(MovementError::DuplicateFacility(id));
        }
        self.channels.create_channel(id);
        self.facilities.insert(id, facility);
        Ok(id)
    }

    /// Register a warehouse and create its channel
    pub fn add_warehouse(&mut self, warehouse: Facility) -> Result<(), MovementError> {
        if warehouse.is_truck() {
            return Err(MovementError::NotAWarehouse(warehouse.id()));
        }
        let id = self.register_facility(warehouse)?;
        self.warehouse_order.push(id);
        Ok(())
    }

    /// Register a truck and create its channel. It is undocked until `dock`.
    pub fn add_truck(&mut self, truck: Facility) -> Result<(), MovementError> {
        if !truck.is_truck() {
            return Err(MovementError::NotATruck(truck.id()));
        }
        let id = self.register_facility(truck)?;
        self.truck_order.push(id);
        Ok(())
    }

    /// Register an item and subscribe it at a warehouse
    pub fn add_item(&mut self, item: Item, warehouse: FacilityId) -> Result<(), MovementError> {
        let tag = item.tag();
        if self.items.contains_key(&tag) {
            return Err(MovementError::DuplicateItem(tag));
        }
        self.require_warehouse(warehouse)?;
        self.channels.subscribe(tag, warehouse)?;
        self.items.insert(tag, item);
        Ok(())
    }

    /// Put a truck at a warehouse without a relocation record (setup)
    pub fn dock(&mut self, truck: FacilityId, warehouse: FacilityId) -> Result<(), MovementError> {
        self.require_truck(truck)?;
        self.require_warehouse(warehouse)?;
        self.docked.insert(truck, warehouse);
        Ok(())
    }

    pub(crate) fn require_truck(&self, id: FacilityId) -> Result<&Facility, MovementError> {
        let facility = self.facilities.get(&id).ok_or(MovementError::UnknownFacility(id))?;
        if !facility.is_truck() {
            return Err(MovementError::NotATruck(id));
        }
        Ok(facility)
    }

    pub(crate) fn require_warehouse(&self, id: FacilityId) -> Result<&Facility, MovementError> {
        let facility = self.facilities.get(&id).ok_or(MovementError::UnknownFacility(id))?;
        if facility.is_truck() {
            return Err(MovementError::NotAWarehouse(id));
        }
        Ok(facility)
    }

    pub fn item(&self, tag: ItemTag) -> Option<&Item> {
        self.items.get(&tag)
    }

    pub fn facility(&self, id: FacilityId) -> Option<&Facility> {
        self.facilities.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn warehouses(&self) -> &[FacilityId] {
        &self.warehouse_order
    }

    pub fn trucks(&self) -> &[FacilityId] {
        &self.truck_order
    }

    pub fn policy(&self) -> RulePolicy {
        self.policy
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn location_of(&self, item: ItemTag) -> Option<FacilityId> {
        self.channels.location_of(item)
    }

    pub fn dock_of(&self, truck: FacilityId) -> Option<FacilityId> {
        self.docked.get(&truck).copied()
    }

    /// Whether the item currently sits on a truck
    pub fn is_on_truck(&self, item: ItemTag) -> bool {
        self.location_of(item)
            .and_then(|at| self.facilities.get(&at))
            .is_some_and(Facility::is_truck)
    }

    /// Items subscribed at a facility, in tag order
    pub fn items_at(&self, facility: FacilityId) -> Vec<ItemTag> {
        self.channels.subscribers(facility).collect()
    }

    /// Trucks docked at each warehouse, in truck registration order
    pub fn docking_map(&self) -> FxHashMap<FacilityId, Vec<FacilityId>> {
        let mut map: FxHashMap<FacilityId, Vec<FacilityId>> = FxHashMap::default();
        for &truck in &self.truck_order {
            if let Some(&warehouse) = self.docked.get(&truck) {
                map.entry(warehouse).or_default().push(truck);
            }
        }
        map
    }

    /// Apply a plan in phase order: every unload, then every load, then
    /// every relocation, then the sensor broadcast.
    ///
    /// A load therefore always sees truck aggregates after all of this
    /// tick's unloads. Caller errors skip the entry and are collected in
    /// the report; they never abort the tick.
    pub fn run_tick(&mut self, tick: Tick, plan: &TickPlan) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::new(tick);

        for &item in &plan.unloads {
            match self.unload(tick, item) {
                Ok(outcome) => {
                    report.unloads += 1;
                    report.movements.push(outcome.movement);
                    report.violations.extend(outcome.violations);
                }
                Err(e) => report.skip("unload", e),
            }
        }

        for &(item, truck) in &plan.loads {
            match self.load(tick, item, truck) {
                Ok(outcome) => {
                    if outcome.loaded {
                        report.loads += 1;
                        if outcome.would_reject() {
                            report.loads_would_reject += 1;
                        }
                    } else {
                        report.loads_rejected += 1;
                    }
                    report.movements.extend(outcome.movement);
                    report.violations.extend(outcome.violations);
                }
                Err(e) => report.skip("load", e),
            }
        }

        for &truck in &plan.relocations {
            match self.relocate(tick, truck) {
                Ok(record) => report.relocations.push(record),
                Err(e) => report.skip("relocate", e),
            }
        }

        if plan.broadcast_sensors {
            let outcome = self.broadcast_sensors(tick);
            report.readings = outcome.readings;
            report.violations.extend(outcome.violations);
        }

        let elapsed_us = start.elapsed().as_micros() as u64;
        self.metrics.record_tick(elapsed_us);
        debug!(
            tick = %tick,
            unloads = %report.unloads,
            loads = %report.loads,
            rejected = %report.loads_rejected,
            relocations = %report.relocations.len(),
            readings = %report.readings,
            violations = %report.violations.len(),
            elapsed_us = %elapsed_us,
            "tick_completed"
        );
        report
    }
}
