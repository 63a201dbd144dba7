//! Fan-out of one alert to every resolved recipient.

use super::message::compose_alert;
use super::recipients::{resolve_recipients, RecipientDefaults, RecipientDirectory, StaticDirectory};
use super::transport::{ConsoleTransport, NotificationTransport};
use crate::core::types::Anomaly;
use chrono_tz::Tz;
use std::sync::Arc;

/// Result of dispatching one alert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub recipients: Vec<String>,
    pub delivered: u64,
    pub failed: u64,
}

/// Resolves recipients for an anomaly and delivers the composed alert.
#[derive(Clone)]
pub struct Notifier {
    directory: Arc<dyn RecipientDirectory>,
    defaults: RecipientDefaults,
    transport: Arc<dyn NotificationTransport>,
    timezone: Tz,
}

impl Notifier {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        defaults: RecipientDefaults,
        transport: Arc<dyn NotificationTransport>,
        timezone: Tz,
    ) -> Self {
        Self {
            directory,
            defaults,
            transport,
            timezone,
        }
    }

    /// Deliver an alert for `anomaly`.
    ///
    /// Each recipient is attempted independently; failures are logged and
    /// counted, never propagated.
    pub fn dispatch(&self, anomaly: &Anomaly) -> DispatchReport {
        let recipients = resolve_recipients(self.directory.as_ref(), &self.defaults, &anomaly.subject_id);
        if recipients.is_empty() {
            tracing::warn!(
                "No recipients for {} alert on {}",
                anomaly.sensor_kind,
                anomaly.subject_id
            );
            return DispatchReport::default();
        }

        let message = compose_alert(anomaly, self.timezone);
        let mut report = DispatchReport {
            recipients: recipients.clone(),
            ..DispatchReport::default()
        };

        for to in &recipients {
            match self.transport.deliver(to, &message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Alert delivery to {} failed: {}", to, e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl Default for Notifier {
    /// Log-only alerts with an empty directory and no fallbacks.
    fn default() -> Self {
        Self::new(
            Arc::new(StaticDirectory::default()),
            RecipientDefaults::default(),
            Arc::new(ConsoleTransport),
            chrono_tz::UTC,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SensorKind;
    use crate::notify::recipients::Profile;
    use crate::notify::transport::{Notification, TransportError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyTransport {
        delivered: Mutex<Vec<String>>,
    }

    impl NotificationTransport for FlakyTransport {
        fn deliver(&self, to: &str, _message: &Notification) -> Result<(), TransportError> {
            if to.starts_with("down") {
                return Err(TransportError::Rejected(to.to_string()));
            }
            self.delivered.lock().unwrap().push(to.to_string());
            Ok(())
        }
    }

    fn anomaly() -> Anomaly {
        Anomaly {
            subject_id: "alice".to_string(),
            sensor_kind: SensorKind::Eda,
            timestamp: 1_700_000_000.0,
            observed_average: 6.0,
            threshold: 5.0,
            window_size: 10,
        }
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let transport = Arc::new(FlakyTransport::default());
        let directory = StaticDirectory::default()
            .with_profile("alice", Profile::with_email("down@x"))
            .with_extras(["b@y", "c@z"]);
        let notifier = Notifier::new(
            Arc::new(directory),
            RecipientDefaults::default(),
            transport.clone(),
            chrono_tz::UTC,
        );

        let report = notifier.dispatch(&anomaly());
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            *transport.delivered.lock().unwrap(),
            vec!["b@y".to_string(), "c@z".to_string()]
        );
    }

    #[test]
    fn test_no_recipients() {
        let report = Notifier::default().dispatch(&anomaly());
        assert_eq!(report, DispatchReport::default());
    }
}
