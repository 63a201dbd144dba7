//! Per-sensor summaries over a trailing window of days.

use crate::core::types::{Reading, SensorKind};
use crate::error::StoreError;
use crate::store::ReadingStore;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Descriptive statistics for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Summary of every sensor with data in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub subject_id: Option<String>,
    pub days: u32,
    pub since: f64,
    pub sensors: BTreeMap<SensorKind, SensorSummary>,
    pub total: usize,
}

/// Group readings by sensor and summarize each group.
pub fn summarize_readings(readings: &[Reading]) -> BTreeMap<SensorKind, SensorSummary> {
    let mut grouped: BTreeMap<SensorKind, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        grouped.entry(reading.sensor_kind).or_default().push(reading.value);
    }

    grouped
        .into_iter()
        .map(|(kind, values)| {
            let summary = SensorSummary {
                mean: values.iter().sum::<f64>() / values.len() as f64,
                min: Statistics::min(values.iter()),
                max: Statistics::max(values.iter()),
                count: values.len(),
            };
            (kind, summary)
        })
        .collect()
}

/// Summarize readings from the last `days` days before `now` (seconds).
pub fn summarize<S: ReadingStore + ?Sized>(
    store: &S,
    subject_id: Option<&str>,
    days: u32,
    now: f64,
) -> Result<WindowSummary, StoreError> {
    let since = now - f64::from(days) * SECONDS_PER_DAY;
    let readings = store.readings_since(subject_id, since)?;

    Ok(WindowSummary {
        subject_id: subject_id.map(str::to_string),
        days,
        since,
        sensors: summarize_readings(&readings),
        total: readings.len(),
    })
}
