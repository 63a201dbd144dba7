//! Core pipeline logic for the Synheart Vitals Agent.
//!
//! This module contains:
//! - Sensor, reading and anomaly types
//! - Timestamp normalization
//! - The notification cooldown gate
//! - Moving-average anomaly detection
//! - Trailing-window summaries

pub mod cooldown;
pub mod detector;
pub mod summary;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use cooldown::{should_notify, DEFAULT_COOLDOWN_SECS};
pub use detector::{AnomalyDetector, DetectionSettings, DEFAULT_WINDOW_SIZE};
pub use summary::{summarize, SensorSummary, WindowSummary};
pub use time::{format_local, normalize, now_seconds};
pub use types::{Anomaly, Order, Reading, SensorKind};
