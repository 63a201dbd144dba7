//! Configuration for the Synheart Vitals Agent.

use crate::core::cooldown::DEFAULT_COOLDOWN_SECS;
use crate::core::detector::{DetectionSettings, DEFAULT_WINDOW_SIZE};
use crate::core::types::SensorKind;
use crate::notify::{parse_address_list, RecipientDefaults};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How alerts leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    /// Write alerts to the log only
    Console,
    /// Queue alerts in the outbox file for a mail relay
    Outbox,
}

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of readings in the moving average
    pub window_size: usize,

    /// Alert threshold per sensor
    pub thresholds: BTreeMap<SensorKind, f64>,

    /// Minimum spacing between alerts for the same subject and sensor
    pub cooldown_secs: u64,

    /// Pause between feeder rounds
    #[serde(with = "duration_serde")]
    pub feed_interval: Duration,

    /// SQLite database holding readings and anomalies
    pub database_path: PathBuf,

    /// Directory with one sub-directory of wrist sample files per subject
    pub samples_dir: PathBuf,

    /// IANA timezone used in alert bodies
    pub timezone: String,

    /// Sender address, also the fallback primary recipient
    pub from_email: Option<String>,

    /// Comma-separated fallback list of extra recipients
    pub alert_extra: String,

    pub notification_mode: NotificationMode,

    /// Outbox file used in `outbox` mode
    pub outbox_path: PathBuf,

    /// JSONL mirror of readings and anomalies (disabled when unset)
    pub mirror_path: Option<PathBuf>,

    /// Recipient directory file (profiles and shared alert list)
    pub recipients_path: Option<PathBuf>,

    /// Port of the HTTP server
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            thresholds: SensorKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.default_threshold()))
                .collect(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            feed_interval: Duration::from_secs(1),
            database_path: data_dir.join("vitals.db"),
            samples_dir: data_dir.join("data_samples"),
            timezone: "UTC".to_string(),
            from_email: None,
            alert_extra: String::new(),
            notification_mode: NotificationMode::Console,
            outbox_path: data_dir.join("outbox.jsonl"),
            mirror_path: None,
            recipients_path: None,
            server_port: 5000,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load only the configuration file, or defaults if there is none.
    pub fn load_file() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-vitals")
            .join("config.json")
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-vitals")
    }

    /// Apply overrides using the deployment's environment variable names.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MOVING_AVG_WINDOW") {
            self.window_size = parse_env("MOVING_AVG_WINDOW", &v)?;
        }
        for kind in SensorKind::ALL {
            let key = kind.threshold_env_var();
            if let Some(v) = lookup(&key) {
                self.thresholds.insert(kind, parse_env(&key, &v)?);
            }
        }
        if let Some(v) = lookup("ALERT_COOLDOWN_SEC") {
            self.cooldown_secs = parse_env("ALERT_COOLDOWN_SEC", &v)?;
        }
        if let Some(v) = lookup("FEED_INTERVAL_SEC") {
            let secs: f64 = parse_env("FEED_INTERVAL_SEC", &v)?;
            self.feed_interval = Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
                key: "FEED_INTERVAL_SEC".to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FROM_EMAIL") {
            self.from_email = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("ALERT_EXTRA") {
            self.alert_extra = v;
        }
        if let Some(v) = lookup("EMAIL_MODE") {
            self.notification_mode = match v.trim().to_lowercase().as_str() {
                "console" => NotificationMode::Console,
                "outbox" | "smtp" => NotificationMode::Outbox,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "EMAIL_MODE".to_string(),
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("PORT") {
            self.server_port = parse_env("PORT", &v)?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".to_string()));
        }
        if self.feed_interval.is_zero() {
            return Err(ConfigError::Invalid("feed_interval must be positive".to_string()));
        }
        if let Some((kind, _)) = self.thresholds.iter().find(|(_, t)| !t.is_finite()) {
            return Err(ConfigError::Invalid(format!("threshold for {kind} is not finite")));
        }
        self.tz()?;
        Ok(())
    }

    /// Parsed alert timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    /// Detection parameters for the anomaly detector.
    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            window_size: self.window_size,
            thresholds: self.thresholds.clone(),
            cooldown_secs: self.cooldown_secs,
        }
    }

    /// Recipient fallbacks.
    pub fn recipient_defaults(&self) -> RecipientDefaults {
        RecipientDefaults {
            from_email: self.from_email.clone(),
            alert_extra: parse_address_list(&self.alert_extra),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
