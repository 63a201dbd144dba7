//! Synheart Vitals Agent - wearable telemetry ingestion with anomaly alerts.
//!
//! This library ingests per-subject physiological readings (heart rate, skin
//! temperature, electrodermal activity, blood volume pulse, acceleration and
//! inter-beat interval), keeps a moving average per subject and sensor, and
//! raises rate-limited alerts when the average crosses a threshold.
//!
//! # Guarantees
//!
//! - **Persist first**: A reading is stored before it is evaluated
//! - **Consistent view**: Each evaluation sees every reading written before it
//! - **Rate limited**: At most one notification per subject and sensor per cooldown
//! - **Best-effort side channels**: Mirror and delivery failures never block ingestion
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Synheart Vitals Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Feeders   │──▶│   Monitor   │──▶│  Detector   │         │
//! │  │ (per subj.) │   │  (ingest)   │   │ (mov. avg)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         ▲                 │                  │               │
//! │   HTTP / CLI              ▼                  ▼               │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │ Store (SQL) │   │  Notifier   │         │
//! │                    │  + Mirror   │   │ (cooldown)  │         │
//! │                    └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_vitals_agent::{DetectionSettings, MemoryStore, Monitor};
//!
//! let store = Arc::new(MemoryStore::new());
//! let monitor = Monitor::new(store, DetectionSettings::default());
//!
//! let outcome = monitor.ingest("alice", "hr", 1_700_000_000.0, 72.0).unwrap();
//! assert!(outcome.anomaly.is_none());
//! ```

pub mod config;
pub mod core;
pub mod counters;
pub mod error;
pub mod feeder;
pub mod mirror;
pub mod monitor;
pub mod notify;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, NotificationMode};
pub use core::{
    should_notify, summarize, Anomaly, AnomalyDetector, DetectionSettings, Order, Reading,
    SensorKind, WindowSummary,
};
pub use counters::{CounterSnapshot, PipelineCounters, SharedCounters};
pub use error::{IngestError, StoreError, ValidationError};
pub use feeder::{FeederEvent, FeederReport, FeederState, FeederSupervisor};
pub use mirror::{JsonlMirror, MirrorSink, NoopMirror};
pub use monitor::{IngestOutcome, Monitor, SetupError};
pub use notify::{Notifier, RecipientDirectory, NotificationTransport};
pub use store::{AnomalyStore, MemoryStore, ReadingStore, SharedStore, SqliteStore, Store};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
