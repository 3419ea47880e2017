//! Random world generation
//!
//! Draws warehouses on the configured grid, then trucks, then goods with
//! fixed category probabilities. Every id comes from
//! the same seeded ChaCha stream, so a seed reproduces the whole world.

use crate::domain::category::{Category, CategorySet, TempBand};
use crate::domain::facility::Facility;
use crate::domain::item::{Item, Physical};
use crate::domain::temperature::Climate;
use crate::domain::types::{FacilityId, ItemTag, Tick};
use crate::infra::config::Config;
use crate::services::setup::World;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use uuid::{Builder, Uuid};

const P_PERISHABLE: f64 = 0.2;
const P_HAZARDOUS: f64 = 0.1;
const P_FRAGILE: f64 = 0.05;
const P_EDIBLE: f64 = 0.2;
const P_MEDICINAL: f64 = 0.2;
const P_DRY: f64 = 0.2;
/// Chance of a temperature band for goods that don't require one
const P_BANDED: f64 = 0.2;
/// Chance a warehouse or truck is temperature controlled
const P_CONTROLLED: f64 = 0.8;

/// Use-by times are drawn below this tick
const MAX_USE_BY: u64 = 100_000;
const WEIGHT_LAMBDA: f64 = 0.01;
const DIMENSION_LAMBDA: f64 = 0.001;
const MAX_QUANTITY: u64 = 10_000;

fn random_uuid(rng: &mut ChaCha8Rng) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}

/// Exponential sample by inversion
fn exponential(rng: &mut ChaCha8Rng, lambda: f64) -> f64 {
    -(1.0 - rng.gen::<f64>()).ln() / lambda
}

fn random_band(rng: &mut ChaCha8Rng) -> TempBand {
    TempBand::ALL[rng.gen_range(0..TempBand::ALL.len())]
}

pub fn random_climate(rng: &mut ChaCha8Rng) -> Climate {
    if rng.gen_bool(P_CONTROLLED) {
        Climate::Controlled(random_band(rng))
    } else {
        Climate::Uncontrolled
    }
}

/// One item with random categories, physical attributes and use-by
pub fn random_item(rng: &mut ChaCha8Rng) -> Item {
    let tag = ItemTag(random_uuid(rng));
    let physical = Physical {
        weight_kg: exponential(rng, WEIGHT_LAMBDA),
        quantity: rng.gen_range(1..MAX_QUANTITY),
        height_cm: exponential(rng, DIMENSION_LAMBDA) as u64,
        width_cm: exponential(rng, DIMENSION_LAMBDA) as u64,
        breadth_cm: exponential(rng, DIMENSION_LAMBDA) as u64,
    };

    let mut categories = CategorySet::EMPTY;
    let perishable = rng.gen_bool(P_PERISHABLE);
    let use_by = perishable.then(|| Tick(rng.gen_range(0..MAX_USE_BY)));
    for (category, p) in [
        (Category::Perishable, None),
        (Category::Hazardous, Some(P_HAZARDOUS)),
        (Category::Fragile, Some(P_FRAGILE)),
        (Category::Edible, Some(P_EDIBLE)),
        (Category::Medicinal, Some(P_MEDICINAL)),
    ] {
        let on = match p {
            Some(p) => rng.gen_bool(p),
            None => perishable,
        };
        if on {
            categories = categories.with(category);
        }
    }

    let needs_band =
        categories.contains(Category::Perishable) || categories.contains(Category::Medicinal);
    if rng.gen_bool(P_BANDED) || needs_band {
        categories = categories.with_band(random_band(rng));
    }
    if rng.gen_bool(P_DRY) {
        categories = categories.with(Category::Dry);
    }

    let item = Item::with_physical(tag, categories, physical);
    match use_by {
        Some(limit) => item.with_use_by(limit),
        None => item,
    }
}

/// Build the full world described by `config`
pub fn generate_world(config: &Config, rng: &mut ChaCha8Rng) -> World {
    let mut warehouses = Vec::with_capacity(config.warehouse_count());
    for y in 0..config.warehouses_y() {
        for x in 0..config.warehouses_x() {
            let id = FacilityId(random_uuid(rng));
            warehouses.push(Facility::warehouse_at(id, random_climate(rng), x, y));
        }
    }

    let trucks = (0..config.truck_count())
        .map(|_| {
            let id = FacilityId(random_uuid(rng));
            Facility::truck(id, random_climate(rng))
        })
        .collect();

    let items = (0..config.goods()).map(|_| random_item(rng)).collect();

    World { warehouses, trucks, items }
}
