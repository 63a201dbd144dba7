//! Moving-average anomaly detection.
//!
//! For one (subject, sensor) pair the detector averages the newest
//! `window_size` readings and compares the mean against the sensor's
//! threshold. Every breaching evaluation is persisted as its own anomaly;
//! alerts for the pair are throttled by the cooldown gate, whose only state
//! is the last anomaly already in the store.

use crate::core::cooldown::{should_notify, DEFAULT_COOLDOWN_SECS};
use crate::core::time::normalize;
use crate::core::types::{Anomaly, Order, SensorKind};
use crate::counters::{PipelineCounters, SharedCounters};
use crate::error::StoreError;
use crate::mirror::{MirrorSink, NoopMirror};
use crate::notify::Notifier;
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Default moving-average window length.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Detection parameters captured when the detector is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub window_size: usize,
    pub thresholds: BTreeMap<SensorKind, f64>,
    pub cooldown_secs: u64,
}

impl DetectionSettings {
    pub fn threshold(&self, sensor: SensorKind) -> Option<f64> {
        self.thresholds.get(&sensor).copied()
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            thresholds: SensorKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.default_threshold()))
                .collect(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

/// Evaluates moving averages and records breaches.
pub struct AnomalyDetector {
    store: SharedStore,
    settings: DetectionSettings,
    mirror: Arc<dyn MirrorSink>,
    notifier: Notifier,
    counters: SharedCounters,
    /// Held while reading the previous anomaly and writing the new one, so two
    /// racing evaluations cannot both see the same "previous" and both alert.
    decision: Mutex<()>,
}

impl AnomalyDetector {
    pub fn new(store: SharedStore, settings: DetectionSettings) -> Self {
        Self {
            store,
            settings,
            mirror: Arc::new(NoopMirror),
            notifier: Notifier::default(),
            counters: Arc::new(PipelineCounters::new()),
            decision: Mutex::new(()),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorSink>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_counters(mut self, counters: SharedCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Evaluate the newest window for a pair.
    ///
    /// Returns `None` when there is not enough data, no threshold, or no
    /// breach. A returned anomaly has been persisted, whether or not an
    /// alert went out.
    pub fn evaluate(&self, subject_id: &str, sensor: SensorKind) -> Result<Option<Anomaly>, StoreError> {
        let window_size = self.settings.window_size;
        if window_size == 0 {
            return Ok(None);
        }

        let mut window = self
            .store
            .query_readings(subject_id, sensor, Order::NewestFirst, window_size)?;
        if window.len() < window_size {
            tracing::trace!(
                "{}/{}: {} of {} readings, not evaluating",
                subject_id,
                sensor,
                window.len(),
                window_size
            );
            return Ok(None);
        }
        window.reverse();

        let average = window.iter().map(|r| r.value).sum::<f64>() / window.len() as f64;

        let Some(threshold) = self.settings.threshold(sensor) else {
            return Ok(None);
        };
        if average.is_nan() || average <= threshold {
            return Ok(None);
        }

        let newest = match window.last() {
            Some(reading) => normalize(reading.timestamp),
            None => return Ok(None),
        };
        let anomaly = Anomaly {
            subject_id: subject_id.to_string(),
            sensor_kind: sensor,
            timestamp: newest,
            observed_average: average,
            threshold,
            window_size,
        };

        let previous = {
            let _guard = self.decision.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = self
                .store
                .query_last_anomaly(subject_id, sensor)?
                .map(|a| a.timestamp);
            self.store.write_anomaly(&anomaly)?;
            previous
        };
        self.counters.record_anomaly();
        tracing::info!(
            "Anomaly: {} {} average {:.3} > {:.3} over {} readings",
            subject_id,
            sensor,
            average,
            threshold,
            window_size
        );

        if let Err(e) = self.mirror.replicate_anomaly(&anomaly) {
            tracing::warn!("Mirror replication of anomaly failed: {}", e);
            self.counters.record_mirror_failure();
        }

        if should_notify(previous, anomaly.timestamp, self.settings.cooldown_secs) {
            let report = self.notifier.dispatch(&anomaly);
            self.counters.record_notifications_sent(report.delivered);
            self.counters.record_delivery_failures(report.failed);
        } else {
            tracing::debug!(
                "Alert for {}/{} suppressed by {}s cooldown",
                subject_id,
                sensor,
                self.settings.cooldown_secs
            );
            self.counters.record_suppressed();
        }

        Ok(Some(anomaly))
    }
}
