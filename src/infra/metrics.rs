//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so parallel sensor dispatch never
//! contends on a mutex. Reporting swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::rules::Rule;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for tick duration (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Ticks completed (monotonic)
    ticks_total: AtomicU64,
    /// Tick duration histogram buckets (reset on report)
    tick_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of tick durations in microseconds (reset on report)
    tick_sum_us: AtomicU64,
    /// Max tick duration in microseconds (reset on report)
    tick_max_us: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Completed loads (monotonic)
    loads_total: AtomicU64,
    /// Loads refused by an enforced rule (monotonic)
    loads_rejected: AtomicU64,
    /// Loads that proceeded but would have been refused under enforcement (monotonic)
    loads_would_reject: AtomicU64,
    /// Completed unloads (monotonic)
    unloads_total: AtomicU64,
    /// Truck relocations (monotonic)
    relocations_total: AtomicU64,
    /// Relocations that fell back to the first candidate (monotonic)
    relocation_fallbacks: AtomicU64,
    /// Sensor readings published (monotonic)
    readings_total: AtomicU64,
    /// Readings since last report (reset on report)
    readings_since_report: AtomicU64,
    /// Sensor rule violations (monotonic)
    sensor_violations: AtomicU64,
    /// Co-location violations (monotonic)
    colocation_violations: AtomicU64,
    /// Registry disagreed with a transition (monotonic)
    inconsistent_state: AtomicU64,
    /// Setup fallbacks (monotonic)
    configuration_fallbacks: AtomicU64,
    /// Egress records dropped due to channel full (monotonic)
    egress_dropped: AtomicU64,
    /// Per-rule violation counts, keys fixed at construction
    rule_violations: parking_lot::RwLock<FxHashMap<Rule, AtomicU64>>,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let rule_violations = Rule::ALL.into_iter().map(|rule| (rule, AtomicU64::new(0))).collect();
        Self {
            ticks_total: AtomicU64::new(0),
            tick_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_sum_us: AtomicU64::new(0),
            tick_max_us: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            loads_total: AtomicU64::new(0),
            loads_rejected: AtomicU64::new(0),
            loads_would_reject: AtomicU64::new(0),
            unloads_total: AtomicU64::new(0),
            relocations_total: AtomicU64::new(0),
            relocation_fallbacks: AtomicU64::new(0),
            readings_total: AtomicU64::new(0),
            readings_since_report: AtomicU64::new(0),
            sensor_violations: AtomicU64::new(0),
            colocation_violations: AtomicU64::new(0),
            inconsistent_state: AtomicU64::new(0),
            configuration_fallbacks: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            rule_violations: parking_lot::RwLock::new(rule_violations),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a completed tick with its wall-clock duration
    #[inline]
    pub fn record_tick(&self, duration_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        self.tick_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.tick_max_us, duration_us);
    }

    #[inline]
    pub fn record_load(&self) {
        self.loads_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_load_rejected(&self) {
        self.loads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_load_would_reject(&self) {
        self.loads_would_reject.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unload(&self) {
        self.unloads_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_relocation(&self, fallback: bool) {
        self.relocations_total.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.relocation_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_readings(&self, count: u64) {
        self.readings_total.fetch_add(count, Ordering::Relaxed);
        self.readings_since_report.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one item breaking `rules` on a single reading
    pub fn record_sensor_violation(&self, rules: &[Rule]) {
        self.sensor_violations.fetch_add(1, Ordering::Relaxed);
        let counts = self.rule_violations.read();
        for rule in rules {
            if let Some(count) = counts.get(rule) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn record_colocation_violation(&self) {
        self.colocation_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_inconsistent_state(&self) {
        self.inconsistent_state.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_configuration_fallback(&self) {
        self.configuration_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn loads_total(&self) -> u64 {
        self.loads_total.load(Ordering::Relaxed)
    }

    pub fn sensor_violations(&self) -> u64 {
        self.sensor_violations.load(Ordering::Relaxed)
    }

    pub fn egress_dropped(&self) -> u64 {
        self.egress_dropped.load(Ordering::Relaxed)
    }

    /// Violations counted so far for one rule
    pub fn rule_violations(&self, rule: Rule) -> u64 {
        self.rule_violations.read().get(&rule).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn report(&self) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let ticks_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let tick_sum = self.tick_sum_us.swap(0, Ordering::Relaxed);
        let tick_max = self.tick_max_us.swap(0, Ordering::Relaxed);
        let readings_count = self.readings_since_report.swap(0, Ordering::Relaxed);
        let tick_buckets = swap_buckets(&self.tick_buckets);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let readings_per_sec = if elapsed.as_secs_f64() > 0.0 {
            readings_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_tick_us = if ticks_count > 0 { tick_sum / ticks_count } else { 0 };

        let rule_violations = {
            let counts = self.rule_violations.read();
            let mut out: Vec<(Rule, u64)> = Rule::ALL
                .into_iter()
                .map(|rule| (rule, counts.get(&rule).map_or(0, |c| c.load(Ordering::Relaxed))))
                .collect();
            out.retain(|(_, n)| *n > 0);
            out
        };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            avg_tick_us,
            max_tick_us: tick_max,
            tick_p50_us: percentile_from_buckets(&tick_buckets, 0.50),
            tick_p99_us: percentile_from_buckets(&tick_buckets, 0.99),
            readings_total: self.readings_total.load(Ordering::Relaxed),
            readings_per_sec,
            loads_total: self.loads_total.load(Ordering::Relaxed),
            loads_rejected: self.loads_rejected.load(Ordering::Relaxed),
            loads_would_reject: self.loads_would_reject.load(Ordering::Relaxed),
            unloads_total: self.unloads_total.load(Ordering::Relaxed),
            relocations_total: self.relocations_total.load(Ordering::Relaxed),
            relocation_fallbacks: self.relocation_fallbacks.load(Ordering::Relaxed),
            sensor_violations: self.sensor_violations.load(Ordering::Relaxed),
            colocation_violations: self.colocation_violations.load(Ordering::Relaxed),
            inconsistent_state: self.inconsistent_state.load(Ordering::Relaxed),
            configuration_fallbacks: self.configuration_fallbacks.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            rule_violations,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    /// Average tick duration since last report (µs)
    pub avg_tick_us: u64,
    pub max_tick_us: u64,
    pub tick_p50_us: u64,
    pub tick_p99_us: u64,
    pub readings_total: u64,
    pub readings_per_sec: f64,
    pub loads_total: u64,
    pub loads_rejected: u64,
    pub loads_would_reject: u64,
    pub unloads_total: u64,
    pub relocations_total: u64,
    pub relocation_fallbacks: u64,
    pub sensor_violations: u64,
    pub colocation_violations: u64,
    pub inconsistent_state: u64,
    pub configuration_fallbacks: u64,
    pub egress_dropped: u64,
    /// Non-zero per-rule violation counts in rule order
    pub rule_violations: Vec<(Rule, u64)>,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            avg_tick_us = %self.avg_tick_us,
            p99_tick_us = %self.tick_p99_us,
            readings_per_sec = format!("{:.1}", self.readings_per_sec),
            loads = %self.loads_total,
            loads_rejected = %self.loads_rejected,
            loads_would_reject = %self.loads_would_reject,
            unloads = %self.unloads_total,
            relocations = %self.relocations_total,
            sensor_violations = %self.sensor_violations,
            colocation_violations = %self.colocation_violations,
            inconsistent_state = %self.inconsistent_state,
            egress_dropped = %self.egress_dropped,
            "metrics"
        );
    }
}
