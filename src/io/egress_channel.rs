//! Typed channel for record egress
//!
//! Provides a non-blocking way to hand records to the egress writer.
//! Uses a bounded mpsc channel to prevent unbounded memory growth; a full
//! channel drops the record and counts the drop.

use crate::domain::record::{epoch_ms, RelocationRecord, ViolationRecord};
use crate::domain::types::MovementEvent;
use crate::infra::metrics::{Metrics, MetricsSummary};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the egress writer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum EgressMessage {
    /// Rule violation, inconsistency or setup fallback
    Violation(ViolationPayload),
    /// Item load or unload
    Movement(MovementPayload),
    /// Truck moved to another warehouse
    Relocation(RelocationPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

impl EgressMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EgressMessage::Violation(_) => "violation",
            EgressMessage::Movement(_) => "movement",
            EgressMessage::Relocation(_) => "relocation",
            EgressMessage::Metrics(_) => "metrics",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationPayload {
    /// Wall-clock timestamp (epoch ms)
    pub ts: u64,
    #[serde(flatten)]
    pub record: ViolationRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementPayload {
    pub ts: u64,
    #[serde(flatten)]
    pub event: MovementEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelocationPayload {
    pub ts: u64,
    #[serde(flatten)]
    pub record: RelocationRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsPayload {
    pub ts: u64,
    #[serde(flatten)]
    pub summary: MetricsSummary,
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a message; returns false if it was dropped
    pub fn send(&self, msg: EgressMessage) -> bool {
        // Use try_send to avoid blocking the tick - drop if channel full
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(_) => {
                self.metrics.record_egress_dropped();
                false
            }
        }
    }

    pub fn send_violation(&self, record: &ViolationRecord) -> bool {
        self.send(EgressMessage::Violation(ViolationPayload { ts: epoch_ms(), record: record.clone() }))
    }

    pub fn send_movement(&self, event: &MovementEvent) -> bool {
        self.send(EgressMessage::Movement(MovementPayload { ts: epoch_ms(), event: *event }))
    }

    pub fn send_relocation(&self, record: &RelocationRecord) -> bool {
        self.send(EgressMessage::Relocation(RelocationPayload { ts: epoch_ms(), record: *record }))
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) -> bool {
        self.send(EgressMessage::Metrics(MetricsPayload { ts: epoch_ms(), summary }))
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EgressSender::new(tx, metrics), rx)
}
