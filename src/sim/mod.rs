//! Simulation driver - world generation and the tick loop collaborator
//!
//! The core never calls into this module. It generates a world, installs
//! it into a `Coordinator`, and on every step decides a `TickPlan` and
//! hands it to `Coordinator::run_tick`.

pub mod generate;
pub mod plan;

pub use generate::generate_world;
pub use plan::plan_tick;

use crate::domain::record::ViolationRecord;
use crate::domain::types::Tick;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::EgressSender;
use crate::services::coordinator::{Coordinator, MovementError, TickReport};
use crate::services::sensors::SensorSynth;
use crate::services::setup::install;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Stream used for movement decisions, apart from world generation
const PLAN_STREAM: u64 = 1;

/// Totals of a finished or interrupted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub seed: u64,
    /// Ticks actually run
    pub ticks: Tick,
    /// Violation records, including setup fallbacks
    pub violations: u64,
    pub interrupted: bool,
}

pub struct Simulation {
    coordinator: Coordinator,
    metrics: Arc<Metrics>,
    egress: Option<EgressSender>,
    rng: ChaCha8Rng,
    load_probability: f64,
    seed: u64,
    tick: Tick,
    setup_fallbacks: Vec<ViolationRecord>,
}

impl Simulation {
    /// Generate and install a world. A config without a seed gets a random one.
    pub fn new(
        config: &Config,
        metrics: Arc<Metrics>,
        egress_sender: Option<EgressSender>,
    ) -> Result<Self, MovementError> {
        let seed = config.seed().unwrap_or_else(rand::random);
        let mut world_rng = ChaCha8Rng::seed_from_u64(seed);
        let world = generate_world(config, &mut world_rng);

        let mut coordinator = Coordinator::new(config.rules(), metrics.clone(), seed)
            .with_sensor_synth(SensorSynth::new(seed.wrapping_add(1), config.temp_excursion_probability()))
            .with_parallel_sensors(config.parallel_sensors());
        if let Some(sender) = &egress_sender {
            coordinator = coordinator.with_egress(sender.clone());
        }
        let setup_fallbacks = install(&mut coordinator, world)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(PLAN_STREAM);

        info!(
            seed = %seed,
            items = %coordinator.item_count(),
            warehouses = %coordinator.warehouses().len(),
            trucks = %coordinator.trucks().len(),
            "simulation_ready"
        );
        Ok(Self {
            coordinator,
            metrics,
            egress: egress_sender,
            rng,
            load_probability: config.load_probability(),
            seed,
            tick: Tick::default(),
            setup_fallbacks,
        })
    }

    /// Plan and run the next tick
    pub fn step(&mut self) -> TickReport {
        let plan = plan_tick(&self.coordinator, self.load_probability, &mut self.rng);
        let report = self.coordinator.run_tick(self.tick, &plan);
        self.tick = self.tick.next();
        report
    }

    /// Step until `hours` ticks have run or `shutdown` turns true.
    ///
    /// Blocks the calling thread between ticks, so async callers run it
    /// under `spawn_blocking`. A metrics summary is logged and sent to
    /// egress every `report_every` ticks.
    pub fn run(
        &mut self,
        hours: u64,
        tick_interval: Duration,
        report_every: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> RunSummary {
        let report_every = report_every.max(1);
        let mut violations = self.setup_fallbacks.len() as u64;
        let mut interrupted = false;

        while self.tick.0 < hours {
            if *shutdown.borrow() {
                warn!(tick = %self.tick, "simulation_interrupted");
                interrupted = true;
                break;
            }

            let report = self.step();
            violations += report.violations.len() as u64;

            if (report.tick.0 + 1) % report_every == 0 {
                let summary = self.metrics.report();
                summary.log();
                if let Some(egress) = &self.egress {
                    egress.send_metrics(summary);
                }
            }

            if !tick_interval.is_zero() {
                std::thread::sleep(tick_interval);
            }
        }

        RunSummary { seed: self.seed, ticks: self.tick, violations, interrupted }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next tick to run
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Items placed at the fallback warehouse during setup
    pub fn setup_fallbacks(&self) -> &[ViolationRecord] {
        &self.setup_fallbacks
    }
}
