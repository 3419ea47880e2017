//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `egress_channel` - Typed bounded channel for records
//! - `egress` - Record output to file (JSONL format)

pub mod egress;
pub mod egress_channel;

// Re-export commonly used types
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
