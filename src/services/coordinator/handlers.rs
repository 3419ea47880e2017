//! Transition handlers for the Coordinator

use super::{Coordinator, LoadOutcome, MovementError, SensorOutcome, UnloadOutcome};
use crate::domain::facility::Facility;
use crate::domain::item::Item;
use crate::domain::record::{LoadCheck, RelocationRecord, ViolationDetail, ViolationRecord};
use crate::domain::types::{Direction, FacilityId, ItemTag, MovementEvent, SensorReading, Tick};
use crate::infra::config::RulePolicy;
use crate::services::channels::ChannelMessage;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info, warn};

impl Coordinator {
    /// Unload an item from the truck it is on into the warehouse that
    /// truck is docked at.
    pub fn unload(&mut self, tick: Tick, item: ItemTag) -> Result<UnloadOutcome, MovementError> {
        if !self.items.contains_key(&item) {
            return Err(MovementError::UnknownItem(item));
        }
        let at = self.channels.location_of(item);
        let truck = match at.and_then(|id| self.facilities.get(&id)) {
            Some(facility) if facility.is_truck() => facility.id(),
            _ => return Err(MovementError::NotOnTruck { item, at }),
        };
        self.unload_from(tick, item, truck)
    }

    /// Unload an item the caller believes is on `truck`.
    ///
    /// If the item is not subscribed there, an inconsistent-state record is
    /// produced and the item is still moved to the truck's dock.
    pub fn unload_from(
        &mut self,
        tick: Tick,
        item: ItemTag,
        truck: FacilityId,
    ) -> Result<UnloadOutcome, MovementError> {
        if !self.items.contains_key(&item) {
            return Err(MovementError::UnknownItem(item));
        }
        self.require_truck(truck)?;
        let warehouse = self.dock_of(truck).ok_or(MovementError::Undocked(truck))?;

        let moved = self.channels.move_subscription(item, truck, warehouse)?;

        let mut violations = Vec::new();
        if !moved.was_at_source {
            violations.push(ViolationRecord::missing_subscription(tick, item, truck, moved.previous));
        }

        // Reset every truck this move left empty
        let mut truck_emptied = false;
        let left = [Some(truck), moved.previous.filter(|&p| p != truck)];
        for id in left.into_iter().flatten() {
            if let Some(facility) = self.facilities.get_mut(&id) {
                if facility.is_truck() && self.channels.subscriber_count(id) == 0 {
                    facility.reset_aggregate();
                    truck_emptied |= id == truck;
                }
            }
        }

        let movement = MovementEvent {
            tick,
            item,
            source: truck,
            destination: warehouse,
            direction: Direction::Unload,
        };
        self.metrics.record_unload();
        debug!(
            tick = %tick,
            item = %item,
            truck = %truck,
            warehouse = %warehouse,
            truck_emptied = %truck_emptied,
            "item_unloaded"
        );
        for record in &violations {
            self.report_violation(record);
        }
        self.forward_movement(&movement);

        Ok(UnloadOutcome { movement, truck_emptied, violations })
    }

    /// Co-location and temperature checks for putting `item` on `truck`,
    /// evaluated against the aggregate as it is before the load.
    pub(crate) fn check_load(policy: RulePolicy, item: &Item, truck: &Facility) -> LoadCheck {
        let colocation_ok = item.is_compatible_with_truck_load(truck.aggregate());
        let temperature_ok = item.admissible_at(truck);
        let enforced_reject = (!colocation_ok && policy.enforce_colocation)
            || (!temperature_ok && policy.enforce_temperature);
        LoadCheck { colocation_ok, temperature_ok, enforced_reject }
    }

    /// Load an item from its warehouse onto a truck docked there.
    ///
    /// Preconditions are checked before any state changes. An enforced
    /// failure leaves everything untouched; otherwise the item moves, the
    /// truck aggregate absorbs its categories, and the other items aboard
    /// run a co-location check against it.
    pub fn load(
        &mut self,
        tick: Tick,
        item: ItemTag,
        truck: FacilityId,
    ) -> Result<LoadOutcome, MovementError> {
        let goods = self.items.get(&item).ok_or(MovementError::UnknownItem(item))?;
        let vehicle = self.require_truck(truck)?;

        let at = self.channels.location_of(item);
        let warehouse = match at.and_then(|id| self.facilities.get(&id)) {
            Some(facility) if !facility.is_truck() => facility.id(),
            _ => return Err(MovementError::NotAtWarehouse { item, at }),
        };
        if self.docked.get(&truck) != Some(&warehouse) {
            return Err(MovementError::NotDocked { truck, warehouse });
        }

        let check = Self::check_load(self.policy, goods, vehicle);
        let mut violations = Vec::new();
        if !check.passed() {
            violations.push(ViolationRecord::load_check_failed(
                tick,
                goods,
                truck,
                vehicle.aggregate(),
                check,
            ));
        }

        if check.enforced_reject {
            self.metrics.record_load_rejected();
            info!(
                tick = %tick,
                item = %item,
                truck = %truck,
                colocation_ok = %check.colocation_ok,
                temperature_ok = %check.temperature_ok,
                "load_rejected"
            );
            for record in &violations {
                self.report_violation(record);
            }
            return Ok(LoadOutcome { loaded: false, check, movement: None, violations });
        }
        if !check.passed() {
            self.metrics.record_load_would_reject();
        }

        self.channels.move_subscription(item, warehouse, truck)?;
        if let (Some(vehicle), Some(goods)) = (self.facilities.get_mut(&truck), self.items.get(&item)) {
            vehicle.register_arrival(goods);
        }

        let movement = MovementEvent {
            tick,
            item,
            source: warehouse,
            destination: truck,
            direction: Direction::Load,
        };
        self.metrics.record_load();
        debug!(tick = %tick, item = %item, warehouse = %warehouse, truck = %truck, "item_loaded");

        if self.policy.check_colocation {
            if let Some(loaded) = self.items.get(&item) {
                let message = ChannelMessage::ColocationCheck { tick, loaded };
                violations.extend(self.channels.dispatch(truck, message, &self.items));
            }
        }

        for record in &violations {
            self.report_violation(record);
        }
        self.forward_movement(&movement);

        Ok(LoadOutcome { loaded: true, check, movement: Some(movement), violations })
    }

    /// Move a docked truck to another warehouse.
    ///
    /// Candidates are visited in a fresh random order. With temperature
    /// enforcement on, only warehouses the truck may unload into qualify;
    /// if none does, the first candidate is taken anyway.
    pub fn relocate(&mut self, tick: Tick, truck: FacilityId) -> Result<RelocationRecord, MovementError> {
        let climate = self.require_truck(truck)?.climate();
        let from = self.dock_of(truck).ok_or(MovementError::Undocked(truck))?;

        let mut candidates = self.warehouse_order.clone();
        candidates.shuffle(&mut self.rng);
        let first = candidates.first().copied().ok_or(MovementError::NoWarehouses)?;

        let enforce = self.policy.enforce_temperature;
        let admissible = candidates.iter().copied().find(|w| {
            !enforce || self.facilities.get(w).is_some_and(|f| f.can_receive_from_truck(climate))
        });
        let (to, fallback) = match admissible {
            Some(w) => (w, false),
            None => (first, true),
        };

        self.docked.insert(truck, to);
        let record = RelocationRecord { tick, truck, from, to, fallback };
        self.metrics.record_relocation(fallback);
        if fallback {
            warn!(tick = %tick, truck = %truck, climate = %climate, to = %to, "relocation_fallback");
        } else {
            debug!(tick = %tick, truck = %truck, from = %from, to = %to, "truck_relocated");
        }
        if let Some(sender) = &self.egress_sender {
            sender.send_relocation(&record);
        }
        Ok(record)
    }

    /// Publish one reading to its location's channel
    pub fn publish(&self, reading: &SensorReading) -> Vec<ViolationRecord> {
        self.metrics.record_readings(1);
        let violations = self.channels.dispatch(reading.location, ChannelMessage::Sensor(reading), &self.items);
        for record in &violations {
            self.report_violation(record);
        }
        violations
    }

    /// Synthesize and publish every facility's readings for `tick`.
    ///
    /// Facilities are independent here, so dispatch runs across the rayon
    /// pool when enabled. Results are gathered in facility order.
    pub fn broadcast_sensors(&self, tick: Tick) -> SensorOutcome {
        let facility_order: Vec<FacilityId> =
            self.warehouse_order.iter().chain(self.truck_order.iter()).copied().collect();

        let dispatch_one = |(index, id): (usize, &FacilityId)| -> (usize, Vec<ViolationRecord>) {
            let Some(facility) = self.facilities.get(id) else {
                return (0, Vec::new());
            };
            let readings = self.sensors.readings(tick, facility, index);
            let mut violations = Vec::new();
            if self.channels.subscriber_count(*id) > 0 {
                for reading in &readings {
                    violations.extend(self.channels.dispatch(*id, ChannelMessage::Sensor(reading), &self.items));
                }
            }
            (readings.len(), violations)
        };

        let per_facility: Vec<(usize, Vec<ViolationRecord>)> = if self.parallel_sensors {
            facility_order.par_iter().enumerate().map(dispatch_one).collect()
        } else {
            facility_order.iter().enumerate().map(dispatch_one).collect()
        };

        let mut outcome = SensorOutcome::default();
        for (readings, violations) in per_facility {
            outcome.readings += readings;
            outcome.violations.extend(violations);
        }
        self.metrics.record_readings(outcome.readings as u64);
        for record in &outcome.violations {
            self.report_violation(record);
        }
        debug!(
            tick = %tick,
            facilities = %facility_order.len(),
            readings = %outcome.readings,
            violations = %outcome.violations.len(),
            "sensors_broadcast"
        );
        outcome
    }

    /// Count, log and forward one record
    pub(crate) fn report_violation(&self, record: &ViolationRecord) {
        match &record.detail {
            ViolationDetail::Sensor { metric, value, rules, categories } => {
                self.metrics.record_sensor_violation(rules);
                warn!(
                    tick = %record.tick,
                    item = %record.item,
                    location = %record.location,
                    categories = %categories,
                    metric = %metric,
                    value = format!("{:.2}", value),
                    rules = ?rules,
                    "sensor_violation"
                );
            }
            ViolationDetail::Colocation { loaded, loaded_categories, categories } => {
                self.metrics.record_colocation_violation();
                warn!(
                    tick = %record.tick,
                    item = %record.item,
                    categories = %categories,
                    loaded = %loaded,
                    loaded_categories = %loaded_categories,
                    truck = %record.location,
                    "colocation_violation"
                );
            }
            ViolationDetail::LoadCheckFailed {
                categories,
                truck_aggregate,
                colocation_ok,
                temperature_ok,
                enforced,
            } => {
                warn!(
                    tick = %record.tick,
                    item = %record.item,
                    categories = %categories,
                    truck = %record.location,
                    truck_aggregate = %truck_aggregate,
                    colocation_ok = %colocation_ok,
                    temperature_ok = %temperature_ok,
                    enforced = %enforced,
                    "load_check_failed"
                );
            }
            ViolationDetail::MissingSubscription { expected, actual } => {
                self.metrics.record_inconsistent_state();
                warn!(
                    tick = %record.tick,
                    item = %record.item,
                    expected = %expected,
                    actual = ?actual,
                    "inconsistent_state"
                );
            }
            ViolationDetail::NoAdmissibleWarehouse { band, fallback } => {
                self.metrics.record_configuration_fallback();
                warn!(item = %record.item, band = ?band, fallback = %fallback, "no_admissible_warehouse");
            }
        }
        if let Some(sender) = &self.egress_sender {
            sender.send_violation(record);
        }
    }

    fn forward_movement(&self, movement: &MovementEvent) {
        if let Some(sender) = &self.egress_sender {
            sender.send_movement(movement);
        }
    }
}
