//! Readings, anomalies and the closed set of wearable sensor kinds.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Telemetry channel reported by the wrist device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Heart rate
    Hr,
    /// Skin temperature
    Temp,
    /// Electrodermal activity (skin conductance)
    Eda,
    /// Blood-volume pulse
    Bvp,
    /// Acceleration magnitude
    Acc,
    /// Inter-beat interval
    Ibi,
}

impl SensorKind {
    /// Every sensor kind, in the order feeders visit them.
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Acc,
        SensorKind::Bvp,
        SensorKind::Eda,
        SensorKind::Hr,
        SensorKind::Ibi,
        SensorKind::Temp,
    ];

    /// Wire and storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Hr => "hr",
            SensorKind::Temp => "temp",
            SensorKind::Eda => "eda",
            SensorKind::Bvp => "bvp",
            SensorKind::Acc => "acc",
            SensorKind::Ibi => "ibi",
        }
    }

    /// Human-readable label used in alerts.
    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Hr => "Heart rate",
            SensorKind::Temp => "Skin temperature",
            SensorKind::Eda => "Skin conductance",
            SensorKind::Bvp => "Blood volume pulse",
            SensorKind::Acc => "Acceleration",
            SensorKind::Ibi => "Inter-beat interval",
        }
    }

    /// Unit of the raw values.
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Hr => "bpm",
            SensorKind::Temp => "°C",
            SensorKind::Eda => "μS",
            SensorKind::Bvp => "normalized",
            SensorKind::Acc => "g",
            SensorKind::Ibi => "s",
        }
    }

    /// Threshold applied when the configuration does not override it.
    pub fn default_threshold(&self) -> f64 {
        match self {
            SensorKind::Hr => 120.0,
            SensorKind::Temp => 38.5,
            SensorKind::Eda => 5.0,
            SensorKind::Bvp => 1.5,
            SensorKind::Acc => 2.5,
            SensorKind::Ibi => 1.2,
        }
    }

    /// File name of this sensor's sample export inside a subject directory.
    pub fn sample_file(&self) -> &'static str {
        match self {
            SensorKind::Hr => "wrist_hr.csv",
            SensorKind::Temp => "wrist_skin_temperature.csv",
            SensorKind::Eda => "wrist_eda.csv",
            SensorKind::Bvp => "wrist_bvp.csv",
            SensorKind::Acc => "wrist_acc.csv",
            SensorKind::Ibi => "wrist_ibi.csv",
        }
    }

    /// Name of the environment variable overriding this sensor's threshold.
    pub fn threshold_env_var(&self) -> String {
        format!("THRESH_{}", self.as_str().to_uppercase())
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownSensor(s.to_string()))
    }
}

/// A single persisted sample. Timestamps are always in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub subject_id: String,
    pub sensor_kind: SensorKind,
    pub timestamp: f64,
    pub value: f64,
}

impl Reading {
    pub fn new(subject_id: impl Into<String>, sensor_kind: SensorKind, timestamp: f64, value: f64) -> Self {
        Self {
            subject_id: subject_id.into(),
            sensor_kind,
            timestamp,
            value,
        }
    }
}

/// A moving-average threshold breach.
///
/// One record is written per breaching evaluation; consecutive breaches are
/// not merged. Only notification is throttled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub subject_id: String,
    pub sensor_kind: SensorKind,
    /// Timestamp (seconds) of the newest reading in the triggering window
    pub timestamp: f64,
    pub observed_average: f64,
    pub threshold: f64,
    /// Window length in effect when the breach was evaluated
    pub window_size: usize,
}

/// Sort direction for reading queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    OldestFirst,
    NewestFirst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_kind_parsing() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>().unwrap(), kind);
        }
        assert_eq!(
            "spo2".parse::<SensorKind>(),
            Err(ValidationError::UnknownSensor("spo2".to_string()))
        );
        // Keys are case sensitive, as on the wire
        assert!("HR".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_sensor_kind_serde() {
        let json = serde_json::to_string(&SensorKind::Temp).unwrap();
        assert_eq!(json, "\"temp\"");
        let kind: SensorKind = serde_json::from_str("\"ibi\"").unwrap();
        assert_eq!(kind, SensorKind::Ibi);
    }

    #[test]
    fn test_threshold_env_var() {
        assert_eq!(SensorKind::Hr.threshold_env_var(), "THRESH_HR");
        assert_eq!(SensorKind::Temp.threshold_env_var(), "THRESH_TEMP");
    }
}
