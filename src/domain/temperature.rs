//! Temperature ranges for the five environmental bands

use crate::domain::category::TempBand;
use rand::Rng;

/// Absolute lower bound used for open-ended ranges (°C)
pub const ABSOLUTE_MIN_C: f64 = -273.0;
/// Upper bound used for open-ended ranges (°C)
pub const UNCONSTRAINED_MAX_C: f64 = 1000.0;

/// Temperature capability of a facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Climate {
    #[default]
    Uncontrolled,
    Controlled(TempBand),
}

impl Climate {
    pub fn band(self) -> Option<TempBand> {
        match self {
            Climate::Uncontrolled => None,
            Climate::Controlled(band) => Some(band),
        }
    }

    /// Range the facility's own temperature sensor reports within
    pub fn range(self) -> TemperatureRange {
        TemperatureRange::for_band(self.band())
    }
}

impl std::fmt::Display for Climate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Climate::Uncontrolled => f.write_str("uncontrolled"),
            Climate::Controlled(band) => f.write_str(band.as_str()),
        }
    }
}

impl serde::Serialize for Climate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inclusive temperature range of a band, or the unconstrained range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    band: Option<TempBand>,
    min: f64,
    max: f64,
}

impl TemperatureRange {
    pub fn for_band(band: Option<TempBand>) -> Self {
        let (min, max) = match band {
            None => (ABSOLUTE_MIN_C, UNCONSTRAINED_MAX_C),
            Some(TempBand::Frozen) => (ABSOLUTE_MIN_C, -20.0),
            Some(TempBand::HeatSensitive) => (2.0, 8.0),
            Some(TempBand::Cool) => (8.0, 15.0),
            Some(TempBand::Room) => (15.0, 25.0),
            Some(TempBand::Ambient) => (1.0, 30.0),
        };
        Self { band, min, max }
    }

    pub fn unconstrained() -> Self {
        Self::for_band(None)
    }

    pub fn band(&self) -> Option<TempBand> {
        self.band
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn contains(&self, celsius: f64) -> bool {
        celsius >= self.min && celsius <= self.max
    }

    /// Uniform value inside the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.min + (self.max - self.min) * rng.gen::<f64>()
    }

    /// Value that lands 1°C outside the range with the given probability
    pub fn sample_with_excursion<R: Rng + ?Sized>(&self, rng: &mut R, probability: f64) -> f64 {
        if !rng.gen_bool(probability.clamp(0.0, 1.0)) {
            return self.sample(rng);
        }
        if rng.gen_bool(0.5) {
            self.max + 1.0
        } else {
            self.min - 1.0
        }
    }
}
