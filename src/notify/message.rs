//! Alert message composition.

use super::transport::Notification;
use crate::core::time::format_local;
use crate::core::types::Anomaly;
use chrono_tz::Tz;

/// Compose the alert sent for a threshold breach.
pub fn compose_alert(anomaly: &Anomaly, tz: Tz) -> Notification {
    let sensor = anomaly.sensor_kind;
    let label = sensor.label();

    let subject_line = format!("[ALERT] {} - {} above threshold", anomaly.subject_id, label);
    let body = format!(
        "Hello,\n\n\
         An anomaly has been detected.\n\n\
         Subject: {subject}\n\
         Sensor: {kind} ({label})\n\
         Moving average (last {window}): {average:.3} {unit}\n\
         Threshold: {threshold:.3} {unit}\n\
         Timestamp: {when}\n\n\
         - Synheart Vitals Agent",
        subject = anomaly.subject_id,
        kind = sensor.as_str(),
        label = label,
        window = anomaly.window_size,
        average = anomaly.observed_average,
        threshold = anomaly.threshold,
        unit = sensor.unit(),
        when = format_local(anomaly.timestamp, tz),
    );

    Notification { subject_line, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SensorKind;

    #[test]
    fn test_alert_contents() {
        let anomaly = Anomaly {
            subject_id: "alice".to_string(),
            sensor_kind: SensorKind::Hr,
            timestamp: 0.0,
            observed_average: 131.25,
            threshold: 120.0,
            window_size: 10,
        };

        let message = compose_alert(&anomaly, chrono_tz::UTC);
        assert!(message.subject_line.contains("alice"));
        assert!(message.subject_line.contains("Heart rate"));
        assert!(message.body.contains("last 10"));
        assert!(message.body.contains("131.250 bpm"));
        assert!(message.body.contains("120.000 bpm"));
        assert!(message.body.contains("1970-01-01 00:00:00 UTC"));
    }
}
