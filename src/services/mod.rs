//! Services - business logic and state management
//!
//! This module contains the core behaviour:
//! - `channels` - Per-facility subscriptions and message dispatch
//! - `coordinator` - Load/unload/relocate/broadcast and tick orchestration
//! - `setup` - Initial item placement and truck docking
//! - `sensors` - Per-facility sensor reading synthesis

pub mod channels;
pub mod coordinator;
pub mod sensors;
pub mod setup;

// Re-export commonly used types
pub use channels::{ChannelError, ChannelMessage, ChannelRegistry};
pub use coordinator::{
    Coordinator, LoadOutcome, MovementError, SensorOutcome, TickPlan, TickReport, UnloadOutcome,
};
pub use sensors::SensorSynth;
pub use setup::{install, World};
