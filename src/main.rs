//! Haulage - logistics rule engine simulator
//!
//! Moves goods between warehouses and trucks hour by hour, checks every
//! sensor reading and every load against the goods' handling rules, and
//! writes each violation, movement and relocation as a JSON line.
//!
//! Module structure:
//! - `domain/` - Core types (categories, items, facilities, rules, records)
//! - `services/` - Channels, the movement coordinator, setup, sensors
//! - `sim/` - World generation and per-tick movement decisions
//! - `io/` - Record egress (JSONL)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use haulage::infra::{Config, Metrics, RulePolicy};
use haulage::io::{create_egress_channel, Egress};
use haulage::sim::Simulation;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Haulage - goods movement and handling-rule simulator
#[derive(Parser, Debug)]
#[command(name = "haulage", version, about)]
struct Args {
    /// Path to TOML configuration file [default: $CONFIG_FILE, then config/dev.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Enforce every handling rule, overrides the config file
    #[arg(long)]
    strict: bool,

    /// Simulated hours (ticks), overrides the config file
    #[arg(long)]
    hours: Option<u64>,

    /// RNG seed, overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Default: INFO, use RUST_LOG=debug for every transition
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "haulage starting");

    let mut config = Config::load(args.config.as_deref());
    if let Some(hours) = args.hours {
        config = config.with_hours(hours);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if args.strict {
        config = config.with_rules(RulePolicy::strict());
    }

    let rules = config.rules();
    info!(
        config_file = %config.config_file(),
        warehouses = %config.warehouse_count(),
        trucks = %config.truck_count(),
        goods = %config.goods(),
        hours = %config.hours(),
        enforce_temperature = %rules.enforce_temperature,
        enforce_colocation = %rules.enforce_colocation,
        check_colocation = %rules.check_colocation,
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Record egress writer
    let (egress_sender, egress_rx) = create_egress_channel(config.egress_channel_capacity(), metrics.clone());
    let egress = Egress::new(config.egress_file());
    let egress_shutdown = shutdown_rx.clone();
    let egress_handle = tokio::spawn(async move { egress.run(egress_rx, egress_shutdown).await });

    let mut simulation = Simulation::new(&config, metrics.clone(), Some(egress_sender))?;

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Ticks are CPU bound and the sensor broadcast fans out on rayon
    let hours = config.hours();
    let tick_interval = Duration::from_millis(config.tick_interval_ms());
    let report_every = config.report_every_ticks();
    let run_shutdown = shutdown_rx.clone();
    // The simulation drops with the closure, closing its egress sender
    let summary =
        tokio::task::spawn_blocking(move || simulation.run(hours, tick_interval, report_every, &run_shutdown))
            .await?;

    info!(
        seed = %summary.seed,
        ticks = %summary.ticks,
        violations = %summary.violations,
        interrupted = %summary.interrupted,
        egress_dropped = %metrics.egress_dropped(),
        "simulation_finished"
    );

    // Drain and stop the writer
    let _ = shutdown_tx.send(true);
    match egress_handle.await {
        Ok(written) => info!(written = %written, "egress_finished"),
        Err(e) => warn!(error = %e, "egress_task_failed"),
    }

    info!("haulage shutdown complete");
    Ok(())
}
