//! Shared identifiers, sensor readings and movement events

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype wrapper for item RFID tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTag(pub Uuid);

impl ItemTag {
    /// Generate a fresh time-sortable tag
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl std::fmt::Display for ItemTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "goods_{}", self.0)
    }
}

/// Newtype wrapper for warehouse and truck identifiers.
///
/// A facility id doubles as the id of that facility's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub Uuid);

impl FacilityId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simulated clock value (one tick is one simulated hour)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Tick(pub u64);

impl Tick {
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityKind {
    Warehouse,
    Truck,
}

impl FacilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityKind::Warehouse => "warehouse",
            FacilityKind::Truck => "truck",
        }
    }
}

/// Sensor metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temp,
    Humidity,
    Illuminance,
    Acceleration,
    VibrationDisplacement,
    VibrationVelocity,
    Ozone,
    Particles,
    ToxicGas,
    SulfurDioxide,
    NitrousOxides,
}

/// Metrics every truck reports once per tick
pub const TRUCK_METRICS: [Metric; 6] = [
    Metric::Temp,
    Metric::Humidity,
    Metric::Illuminance,
    Metric::Acceleration,
    Metric::VibrationDisplacement,
    Metric::VibrationVelocity,
];

/// Metrics every warehouse reports once per tick
pub const WAREHOUSE_METRICS: [Metric; 8] = [
    Metric::Temp,
    Metric::Humidity,
    Metric::Illuminance,
    Metric::Ozone,
    Metric::Particles,
    Metric::ToxicGas,
    Metric::SulfurDioxide,
    Metric::NitrousOxides,
];

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temp => "temp",
            Metric::Humidity => "humidity",
            Metric::Illuminance => "illuminance",
            Metric::Acceleration => "acceleration",
            Metric::VibrationDisplacement => "vibrationDisplacement",
            Metric::VibrationVelocity => "vibrationVelocity",
            Metric::Ozone => "ozone",
            Metric::Particles => "particles",
            Metric::ToxicGas => "toxicGas",
            Metric::SulfurDioxide => "sulfurDioxide",
            Metric::NitrousOxides => "nitrousOxides",
        }
    }

    /// Metric list reported by a facility of the given kind
    pub fn reported_by(kind: FacilityKind) -> &'static [Metric] {
        match kind {
            FacilityKind::Truck => &TRUCK_METRICS,
            FacilityKind::Warehouse => &WAREHOUSE_METRICS,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "temp" => Metric::Temp,
            "humidity" => Metric::Humidity,
            "illuminance" => Metric::Illuminance,
            "acceleration" => Metric::Acceleration,
            "vibrationDisplacement" => Metric::VibrationDisplacement,
            "vibrationVelocity" => Metric::VibrationVelocity,
            "ozone" => Metric::Ozone,
            "particles" => Metric::Particles,
            "toxicGas" => Metric::ToxicGas,
            "sulfurDioxide" => Metric::SulfurDioxide,
            "nitrousOxides" => Metric::NitrousOxides,
            other => return Err(UnknownMetric(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor metric '{0}'")]
pub struct UnknownMetric(pub String);

/// One environmental reading taken at a facility
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub tick: Tick,
    pub location: FacilityId,
    pub metric: Metric,
    pub value: f64,
}

impl SensorReading {
    #[inline]
    pub fn new(tick: Tick, location: FacilityId, metric: Metric, value: f64) -> Self {
        Self { tick, location, metric, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Load,
    Unload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Load => "load",
            Direction::Unload => "unload",
        }
    }
}

/// An item changing location (the RFID load/unload read)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MovementEvent {
    pub tick: Tick,
    pub item: ItemTag,
    pub source: FacilityId,
    pub destination: FacilityId,
    pub direction: Direction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_from_str() {
        assert_eq!("temp".parse::<Metric>().unwrap(), Metric::Temp);
        assert_eq!(
            "vibrationVelocity".parse::<Metric>().unwrap(),
            Metric::VibrationVelocity
        );
        assert!("illuminace".parse::<Metric>().is_err());
    }

    #[test]
    fn test_metric_lists() {
        assert_eq!(Metric::reported_by(FacilityKind::Truck).len(), 6);
        assert_eq!(Metric::reported_by(FacilityKind::Warehouse).len(), 8);
        assert!(!WAREHOUSE_METRICS.contains(&Metric::Acceleration));
        assert!(!TRUCK_METRICS.contains(&Metric::Ozone));
    }

    #[test]
    fn test_metric_serializes_camel_case() {
        let json = serde_json::to_string(&Metric::VibrationDisplacement).unwrap();
        assert_eq!(json, "\"vibrationDisplacement\"");
        for metric in WAREHOUSE_METRICS.iter().chain(TRUCK_METRICS.iter()) {
            let json = serde_json::to_string(metric).unwrap();
            assert_eq!(json.trim_matches('"'), metric.as_str());
        }
    }

    #[test]
    fn test_tag_display_prefix() {
        let tag = ItemTag::from_u128(1);
        assert!(tag.to_string().starts_with("goods_"));
        assert_ne!(ItemTag::generate(), ItemTag::generate());
    }
}
