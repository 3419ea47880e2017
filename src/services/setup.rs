//! Initial placement of items and docking of trucks
//!
//! Items go to the first warehouse (in registration order) whose climate
//! admits their temperature band. An item no warehouse admits goes to the
//! first warehouse and a configuration record is produced. Trucks dock
//! round-robin, one per warehouse; trucks beyond the warehouse count dock
//! at the first warehouse.

use crate::domain::facility::Facility;
use crate::domain::item::Item;
use crate::domain::record::ViolationRecord;
use crate::services::coordinator::{Coordinator, MovementError};
use tracing::info;

/// Entities handed over by the world generator
#[derive(Debug, Clone, Default)]
pub struct World {
    pub warehouses: Vec<Facility>,
    pub trucks: Vec<Facility>,
    pub items: Vec<Item>,
}

/// Register every facility and item, place items and dock trucks.
///
/// Returns the configuration fallbacks taken. Fails only on caller
/// errors (duplicate ids, no warehouses).
pub fn install(coordinator: &mut Coordinator, world: World) -> Result<Vec<ViolationRecord>, MovementError> {
    let World { warehouses, trucks, items } = world;
    if warehouses.is_empty() {
        return Err(MovementError::NoWarehouses);
    }

    let default_warehouse = warehouses[0].id();
    let mut fallbacks = Vec::new();
    let (warehouse_count, truck_count, item_count) = (warehouses.len(), trucks.len(), items.len());

    // Placement needs the facilities themselves, so decide before handing them over
    let placements: Vec<_> = items
        .into_iter()
        .map(|item| {
            let target = warehouses.iter().find(|w| item.admissible_at(w)).map(Facility::id);
            (item, target)
        })
        .collect();

    let warehouse_ids: Vec<_> = warehouses.iter().map(Facility::id).collect();
    for warehouse in warehouses {
        coordinator.add_warehouse(warehouse)?;
    }

    for (item, target) in placements {
        let warehouse = match target {
            Some(w) => w,
            None => {
                let record = ViolationRecord::no_admissible_warehouse(&item, default_warehouse);
                coordinator.report_violation(&record);
                fallbacks.push(record);
                default_warehouse
            }
        };
        coordinator.add_item(item, warehouse)?;
    }

    for (index, truck) in trucks.into_iter().enumerate() {
        let id = truck.id();
        coordinator.add_truck(truck)?;
        let warehouse = warehouse_ids.get(index).copied().unwrap_or(default_warehouse);
        coordinator.dock(id, warehouse)?;
    }

    info!(
        warehouses = %warehouse_count,
        trucks = %truck_count,
        items = %item_count,
        fallbacks = %fallbacks.len(),
        "world_installed"
    );
    Ok(fallbacks)
}
