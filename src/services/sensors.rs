//! Sensor reading synthesis
//!
//! Each facility reports one reading per metric per tick. Values come from
//! a ChaCha stream keyed by (seed, tick, facility index), so the readings
//! of one facility never depend on the order facilities are visited in.

use crate::domain::facility::Facility;
use crate::domain::types::{Metric, SensorReading, Tick};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

/// Readings of one facility for one tick (at most 8 metrics)
pub type Readings = SmallVec<[SensorReading; 8]>;

/// Spreads tick numbers across the seed space
const TICK_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy)]
pub struct SensorSynth {
    seed: u64,
    temp_excursion_probability: f64,
}

impl SensorSynth {
    pub fn new(seed: u64, temp_excursion_probability: f64) -> Self {
        let temp_excursion_probability =
            if temp_excursion_probability.is_finite() { temp_excursion_probability.clamp(0.0, 1.0) } else { 0.0 };
        Self { seed, temp_excursion_probability }
    }

    fn rng_for(&self, tick: Tick, index: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ tick.0.wrapping_mul(TICK_MIX));
        rng.set_stream(index as u64);
        rng
    }

    /// Synthesize the facility's readings for `tick`
    pub fn readings(&self, tick: Tick, facility: &Facility, index: usize) -> Readings {
        let mut rng = self.rng_for(tick, index);
        Metric::reported_by(facility.kind())
            .iter()
            .map(|&metric| {
                let value = match metric {
                    Metric::Temp => facility
                        .climate()
                        .range()
                        .sample_with_excursion(&mut rng, self.temp_excursion_probability),
                    other => {
                        let (min, max) = metric_bounds(other);
                        rng.gen_range(min..=max)
                    }
                };
                SensorReading::new(tick, facility.id(), metric, value)
            })
            .collect()
    }
}

/// Synthesis range of non-temperature metrics
fn metric_bounds(metric: Metric) -> (f64, f64) {
    match metric {
        Metric::Humidity => (0.0, 100.0),
        Metric::Illuminance => (0.0, 100_000.0),
        Metric::Acceleration => (0.0, 100.0),
        Metric::VibrationDisplacement | Metric::VibrationVelocity => (0.0, 1000.0),
        Metric::Ozone | Metric::Particles | Metric::ToxicGas => (0.0, 10_000.0),
        Metric::SulfurDioxide | Metric::NitrousOxides => (0.0, 10.0),
        // Drawn from the facility's range instead
        Metric::Temp => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::TempBand;
    use crate::domain::temperature::Climate;
    use crate::domain::types::{FacilityId, TRUCK_METRICS, WAREHOUSE_METRICS};

    #[test]
    fn test_metric_lists_per_kind() {
        let synth = SensorSynth::new(1, 0.0);
        let truck = Facility::truck(FacilityId::from_u128(1), Climate::Uncontrolled);
        let warehouse = Facility::warehouse(FacilityId::from_u128(2), Climate::Uncontrolled);

        let truck_metrics: Vec<Metric> =
            synth.readings(Tick(0), &truck, 0).iter().map(|r| r.metric).collect();
        let warehouse_metrics: Vec<Metric> =
            synth.readings(Tick(0), &warehouse, 1).iter().map(|r| r.metric).collect();
        assert_eq!(truck_metrics, TRUCK_METRICS);
        assert_eq!(warehouse_metrics, WAREHOUSE_METRICS);
    }

    #[test]
    fn test_values_within_bounds() {
        let synth = SensorSynth::new(9, 0.0);
        let warehouse =
            Facility::warehouse(FacilityId::from_u128(2), Climate::Controlled(TempBand::Cool));
        for t in 0..50 {
            for reading in synth.readings(Tick(t), &warehouse, 3) {
                assert_eq!(reading.location, warehouse.id());
                if reading.metric == Metric::Temp {
                    assert!((8.0..=15.0).contains(&reading.value));
                } else {
                    let (min, max) = metric_bounds(reading.metric);
                    assert!(reading.value >= min && reading.value <= max);
                }
            }
        }
    }

    #[test]
    fn test_deterministic_per_tick_and_index() {
        let synth = SensorSynth::new(5, 0.0);
        let truck = Facility::truck(FacilityId::from_u128(1), Climate::Controlled(TempBand::Room));
        assert_eq!(synth.readings(Tick(3), &truck, 7), synth.readings(Tick(3), &truck, 7));
        assert_ne!(synth.readings(Tick(3), &truck, 7), synth.readings(Tick(4), &truck, 7));
    }

    #[test]
    fn test_full_excursion_leaves_band() {
        let synth = SensorSynth::new(5, 1.0);
        let truck = Facility::truck(FacilityId::from_u128(1), Climate::Controlled(TempBand::Room));
        let temp = synth.readings(Tick(0), &truck, 0)[0];
        assert_eq!(temp.metric, Metric::Temp);
        assert!(temp.value == 26.0 || temp.value == 14.0);
    }

    #[test]
    fn test_nan_excursion_stays_in_band() {
        let synth = SensorSynth::new(5, f64::NAN);
        let truck = Facility::truck(FacilityId::from_u128(1), Climate::Controlled(TempBand::Room));
        for t in 0..20 {
            let temp = synth.readings(Tick(t), &truck, 0)[0];
            assert!((15.0..=25.0).contains(&temp.value));
        }
    }
}
