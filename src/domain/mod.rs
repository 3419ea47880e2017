//! Domain models - core logistics types and the rule engine
//!
//! This module contains the canonical data types used throughout the system:
//! - `CategorySet` - item tags plus at most one temperature band
//! - `TemperatureRange` / `Climate` - band bounds and facility capability
//! - `Item` - goods with immutable categories
//! - `Facility` - warehouses and trucks
//! - `rules` - pure sensor and co-location checks
//! - `ViolationRecord` / `RelocationRecord` - data emitted to observers

pub mod category;
pub mod facility;
pub mod item;
pub mod record;
pub mod rules;
pub mod temperature;
pub mod types;

// Re-export commonly used types at module level
pub use category::{Category, CategorySet, TempBand};
pub use facility::Facility;
pub use item::{Item, Physical};
pub use record::{LoadCheck, RelocationRecord, ViolationDetail, ViolationKind, ViolationRecord};
pub use rules::Rule;
pub use temperature::{Climate, TemperatureRange};
pub use types::{Direction, FacilityId, FacilityKind, ItemTag, Metric, MovementEvent, SensorReading, Tick};
