//! Per-tick movement decisions
//!
//! Every item on a truck is unloaded. Every item that will be in a
//! warehouse after those unloads attempts a load with the configured
//! probability, onto a truck docked at that warehouse chosen uniformly.
//! Every truck then relocates and sensors broadcast.

use crate::domain::types::{FacilityId, ItemTag};
use crate::services::coordinator::{Coordinator, TickPlan};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

pub fn plan_tick(coordinator: &Coordinator, load_probability: f64, rng: &mut ChaCha8Rng) -> TickPlan {
    let mut unloads = Vec::new();
    // Where each warehouse's goods will be once this tick's unloads are done
    let mut stock: FxHashMap<FacilityId, Vec<ItemTag>> = coordinator
        .warehouses()
        .iter()
        .map(|&w| (w, coordinator.items_at(w)))
        .collect();
    for &truck in coordinator.trucks() {
        let aboard = coordinator.items_at(truck);
        if let Some(dock) = coordinator.dock_of(truck) {
            stock.entry(dock).or_default().extend(aboard.iter().copied());
        }
        unloads.extend(aboard);
    }

    let docking = coordinator.docking_map();
    let mut loads = Vec::new();
    for warehouse in coordinator.warehouses() {
        let (Some(goods), Some(trucks)) = (stock.get(warehouse), docking.get(warehouse)) else {
            continue;
        };
        for &item in goods {
            if !rng.gen_bool(load_probability) {
                continue;
            }
            if let Some(&truck) = trucks.choose(rng) {
                loads.push((item, truck));
            }
        }
    }

    TickPlan {
        unloads,
        loads,
        relocations: coordinator.trucks().to_vec(),
        broadcast_sensors: true,
    }
}
