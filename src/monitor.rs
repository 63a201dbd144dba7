//! Ingestion endpoint: the single synchronous entry point for readings.
//!
//! Both the feeders and external producers go through [`Monitor::ingest`].
//! A reading is validated, normalized to seconds, persisted, mirrored on a
//! best-effort basis and then evaluated for its (subject, sensor) pair.

use crate::config::{Config, ConfigError, NotificationMode};
use crate::core::detector::{AnomalyDetector, DetectionSettings};
use crate::core::summary::{summarize, WindowSummary};
use crate::core::time::normalize;
use crate::core::types::{Anomaly, Reading, SensorKind};
use crate::counters::{PipelineCounters, SharedCounters};
use crate::error::{IngestError, StoreError, ValidationError};
use crate::mirror::{JsonlMirror, MirrorError, MirrorSink, NoopMirror};
use crate::notify::{
    ConsoleTransport, FileDirectory, NotificationTransport, Notifier, OutboxTransport,
    RecipientDirectory, StaticDirectory, TransportError,
};
use crate::store::{SharedStore, SqliteStore};
use std::sync::Arc;
use thiserror::Error;

/// What happened to an accepted reading.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// The reading as persisted (timestamp in seconds)
    pub reading: Reading,
    /// Anomaly recorded by the evaluation that followed, if any
    pub anomaly: Option<Anomaly>,
}

/// Errors raised while assembling a monitor from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open mirror: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Failed to open transport: {0}")]
    Transport(#[from] TransportError),
}

/// The ingestion → detection → notification pipeline.
pub struct Monitor {
    store: SharedStore,
    mirror: Arc<dyn MirrorSink>,
    detector: AnomalyDetector,
    counters: SharedCounters,
}

impl Monitor {
    /// Monitor with no mirror and log-only alerts.
    pub fn new(store: SharedStore, settings: DetectionSettings) -> Self {
        Self::builder(store, settings).build()
    }

    pub fn builder(store: SharedStore, settings: DetectionSettings) -> MonitorBuilder {
        MonitorBuilder {
            store,
            settings,
            mirror: Arc::new(NoopMirror),
            notifier: Notifier::default(),
            counters: Arc::new(PipelineCounters::new()),
        }
    }

    /// Assemble the production pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        config.validate()?;

        let store: SharedStore = Arc::new(SqliteStore::open(&config.database_path)?);

        let mirror: Arc<dyn MirrorSink> = match &config.mirror_path {
            Some(path) => Arc::new(JsonlMirror::open(path)?),
            None => Arc::new(NoopMirror),
        };

        let directory: Arc<dyn RecipientDirectory> = match &config.recipients_path {
            Some(path) => Arc::new(FileDirectory::new(path)),
            None => Arc::new(StaticDirectory::default()),
        };

        let transport: Arc<dyn NotificationTransport> = match config.notification_mode {
            NotificationMode::Console => Arc::new(ConsoleTransport),
            NotificationMode::Outbox => Arc::new(OutboxTransport::open(&config.outbox_path)?),
        };

        let notifier = Notifier::new(directory, config.recipient_defaults(), transport, config.tz()?);

        Ok(Self::builder(store, config.detection_settings())
            .mirror(mirror)
            .notifier(notifier)
            .build())
    }

    /// Ingest a reading whose sensor kind arrives as a wire string.
    pub fn ingest(
        &self,
        subject_id: &str,
        sensor_kind: &str,
        timestamp: f64,
        value: f64,
    ) -> Result<IngestOutcome, IngestError> {
        let sensor = match sensor_kind.parse::<SensorKind>() {
            Ok(sensor) => sensor,
            Err(e) => {
                self.counters.record_rejection();
                return Err(e.into());
            }
        };
        self.ingest_reading(subject_id, sensor, timestamp, value)
    }

    /// Ingest a reading for a known sensor kind.
    ///
    /// Store failure on the reading write is returned to the caller. Mirror
    /// and evaluation failures are logged; the written reading stays.
    pub fn ingest_reading(
        &self,
        subject_id: &str,
        sensor: SensorKind,
        timestamp: f64,
        value: f64,
    ) -> Result<IngestOutcome, IngestError> {
        if let Err(e) = validate(subject_id, timestamp, value) {
            self.counters.record_rejection();
            return Err(e.into());
        }

        let reading = Reading::new(subject_id, sensor, normalize(timestamp), value);
        self.store.write_reading(&reading)?;
        self.counters.record_reading();
        tracing::debug!(
            "Stored {} {} = {} at {}",
            reading.subject_id,
            reading.sensor_kind,
            reading.value,
            reading.timestamp
        );

        if let Err(e) = self.mirror.replicate_reading(&reading) {
            tracing::warn!("Mirror replication of reading failed: {}", e);
            self.counters.record_mirror_failure();
        }

        let anomaly = match self.detector.evaluate(subject_id, sensor) {
            Ok(anomaly) => anomaly,
            Err(e) => {
                tracing::error!("Evaluation failed for {}/{}: {}", subject_id, sensor, e);
                None
            }
        };

        Ok(IngestOutcome { reading, anomaly })
    }

    /// Re-run detection for a pair without ingesting anything.
    pub fn evaluate(&self, subject_id: &str, sensor: SensorKind) -> Result<Option<Anomaly>, StoreError> {
        self.detector.evaluate(subject_id, sensor)
    }

    /// Most recent anomalies, newest first.
    pub fn recent_anomalies(&self, limit: usize) -> Result<Vec<Anomaly>, StoreError> {
        self.store.query_recent_anomalies(limit)
    }

    /// A subject's oldest readings, up to `limit`.
    pub fn subject_readings(&self, subject_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.store.subject_readings(subject_id, limit)
    }

    /// Trailing-window summary ending at `now` (seconds).
    pub fn summary(&self, subject_id: Option<&str>, days: u32, now: f64) -> Result<WindowSummary, StoreError> {
        summarize(self.store.as_ref(), subject_id, days, now)
    }

    pub fn settings(&self) -> &DetectionSettings {
        self.detector.settings()
    }

    pub fn counters(&self) -> &SharedCounters {
        &self.counters
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

fn validate(subject_id: &str, timestamp: f64, value: f64) -> Result<(), ValidationError> {
    if subject_id.trim().is_empty() {
        return Err(ValidationError::MissingSubject);
    }
    if !timestamp.is_finite() {
        return Err(ValidationError::NonFiniteTimestamp(timestamp));
    }
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue(value));
    }
    Ok(())
}

/// Builder for [`Monitor`].
pub struct MonitorBuilder {
    store: SharedStore,
    settings: DetectionSettings,
    mirror: Arc<dyn MirrorSink>,
    notifier: Notifier,
    counters: SharedCounters,
}

impl MonitorBuilder {
    pub fn mirror(mut self, mirror: Arc<dyn MirrorSink>) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn counters(mut self, counters: SharedCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn build(self) -> Monitor {
        let detector = AnomalyDetector::new(self.store.clone(), self.settings)
            .with_mirror(self.mirror.clone())
            .with_notifier(self.notifier)
            .with_counters(self.counters.clone());

        Monitor {
            store: self.store,
            mirror: self.mirror,
            detector,
            counters: self.counters,
        }
    }
}
