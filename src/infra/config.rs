//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every key is optional; a missing or unreadable file falls back to
//! defaults with a warning. So does a probability that is not a finite
//! number.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_grid_side")]
    pub warehouses_x: u32,
    #[serde(default = "default_grid_side")]
    pub warehouses_y: u32,
    #[serde(default = "default_trucks_per_warehouse")]
    pub trucks_per_warehouse: u32,
    #[serde(default = "default_goods")]
    pub goods: u32,
    /// RNG seed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            warehouses_x: default_grid_side(),
            warehouses_y: default_grid_side(),
            trucks_per_warehouse: default_trucks_per_warehouse(),
            goods: default_goods(),
            seed: None,
        }
    }
}

fn default_grid_side() -> u32 {
    10
}

fn default_trucks_per_warehouse() -> u32 {
    2
}

fn default_goods() -> u32 {
    1000
}

/// Which rules gate transitions. Checks always run; these flags only
/// decide whether a failing check blocks the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RulePolicy {
    /// Temperature admissibility gates loads and filters relocation targets
    #[serde(default)]
    pub enforce_temperature: bool,
    /// Co-location compatibility gates loads
    #[serde(default)]
    pub enforce_colocation: bool,
    /// Publish a co-location check to the truck channel after each load
    #[serde(default = "default_true")]
    pub check_colocation: bool,
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self { enforce_temperature: false, enforce_colocation: false, check_colocation: true }
    }
}

impl RulePolicy {
    /// Every rule enforced
    pub fn strict() -> Self {
        Self { enforce_temperature: true, enforce_colocation: true, check_colocation: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_hours")]
    pub hours: u64,
    #[serde(default = "default_load_probability")]
    pub load_probability: f64,
    #[serde(default)]
    pub tick_interval_ms: u64,
    #[serde(default = "default_true")]
    pub parallel_sensors: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            hours: default_hours(),
            load_probability: default_load_probability(),
            tick_interval_ms: 0,
            parallel_sensors: true,
        }
    }
}

fn default_hours() -> u64 {
    10
}

fn default_load_probability() -> f64 {
    0.5
}

/// Clamp into [0, 1]; NaN and infinities fall back to `default`
fn probability(key: &'static str, value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        warn!(key, value = %value, default = %default, "config_probability_not_finite");
        default
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SensorsConfig {
    /// Chance a synthesized temperature lands just outside the facility band
    #[serde(default)]
    pub temp_excursion_probability: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for record egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file(), channel_capacity: default_channel_capacity() }
    }
}

fn default_egress_file() -> String {
    "violations.jsonl".to_string()
}

fn default_channel_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_report_every_ticks")]
    pub report_every_ticks: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { report_every_ticks: default_report_every_ticks() }
    }
}

fn default_report_every_ticks() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub rules: RulePolicy,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    warehouses_x: u32,
    warehouses_y: u32,
    trucks_per_warehouse: u32,
    goods: u32,
    seed: Option<u64>,
    rules: RulePolicy,
    hours: u64,
    load_probability: f64,
    tick_interval_ms: u64,
    parallel_sensors: bool,
    temp_excursion_probability: f64,
    egress_file: String,
    egress_channel_capacity: usize,
    report_every_ticks: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            warehouses_x: toml_config.world.warehouses_x,
            warehouses_y: toml_config.world.warehouses_y,
            trucks_per_warehouse: toml_config.world.trucks_per_warehouse,
            goods: toml_config.world.goods,
            seed: toml_config.world.seed,
            rules: toml_config.rules,
            hours: toml_config.driver.hours,
            load_probability: probability(
                "driver.load_probability",
                toml_config.driver.load_probability,
                default_load_probability(),
            ),
            tick_interval_ms: toml_config.driver.tick_interval_ms,
            parallel_sensors: toml_config.driver.parallel_sensors,
            temp_excursion_probability: probability(
                "sensors.temp_excursion_probability",
                toml_config.sensors.temp_excursion_probability,
                0.0,
            ),
            egress_file: toml_config.egress.file,
            egress_channel_capacity: toml_config.egress.channel_capacity.max(1),
            report_every_ticks: toml_config.metrics.report_every_ticks.max(1),
            config_file,
        }
    }

    /// Config file path: the `--config` argument, then CONFIG_FILE, then config/dev.toml
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    /// Resolve the path as `resolve_config_path`, then load as `load_from_path`
    pub fn load(arg: Option<&str>) -> Self {
        Self::load_from_path(&Self::resolve_config_path(arg))
    }

    pub fn warehouses_x(&self) -> u32 {
        self.warehouses_x
    }

    pub fn warehouses_y(&self) -> u32 {
        self.warehouses_y
    }

    pub fn warehouse_count(&self) -> usize {
        self.warehouses_x as usize * self.warehouses_y as usize
    }

    pub fn truck_count(&self) -> usize {
        self.warehouse_count() * self.trucks_per_warehouse as usize
    }

    pub fn goods(&self) -> u32 {
        self.goods
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn rules(&self) -> RulePolicy {
        self.rules
    }

    pub fn hours(&self) -> u64 {
        self.hours
    }

    pub fn load_probability(&self) -> f64 {
        self.load_probability
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn parallel_sensors(&self) -> bool {
        self.parallel_sensors
    }

    pub fn temp_excursion_probability(&self) -> f64 {
        self.temp_excursion_probability
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn egress_channel_capacity(&self) -> usize {
        self.egress_channel_capacity
    }

    pub fn report_every_ticks(&self) -> u64 {
        self.report_every_ticks
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override simulated hours (CLI)
    pub fn with_hours(mut self, hours: u64) -> Self {
        self.hours = hours;
        self
    }

    /// Override RNG seed (CLI)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the rule policy (CLI `--strict`)
    pub fn with_rules(mut self, rules: RulePolicy) -> Self {
        self.rules = rules;
        self
    }
}
