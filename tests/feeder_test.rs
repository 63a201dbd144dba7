//! Integration tests for feeder lifecycle and sample replay.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synheart_vitals_agent::feeder::{open_subject_sources, subject_dir};
use synheart_vitals_agent::{
    DetectionSettings, FeederEvent, FeederState, FeederSupervisor, MemoryStore, Monitor,
    ReadingStore, SensorKind,
};

fn write_samples(root: &Path, subject: &str, files: &[(&str, String)]) {
    let dir = root.join(subject);
    fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn long_series(rows: usize) -> String {
    let mut content = String::from("timestamp,value\n");
    for i in 0..rows {
        content.push_str(&format!("{},{}\n", 1000 + i, 60 + i % 10));
    }
    content
}

/// Pipeline without thresholds, so replay never alerts.
fn pipeline() -> (Arc<MemoryStore>, Arc<Monitor>) {
    let store = Arc::new(MemoryStore::new());
    let settings = DetectionSettings {
        thresholds: BTreeMap::new(),
        ..DetectionSettings::default()
    };
    let monitor = Arc::new(Monitor::new(store.clone(), settings));
    (store, monitor)
}

#[test]
fn test_stop_allows_at_most_one_more_round() {
    let samples = tempfile::tempdir().unwrap();
    write_samples(
        samples.path(),
        "alice",
        &[
            ("wrist_hr.csv", long_series(10_000)),
            ("wrist_eda.csv", long_series(10_000)),
        ],
    );

    let (store, monitor) = pipeline();
    let supervisor = FeederSupervisor::new(monitor, Duration::from_millis(10));
    let sources = open_subject_sources(&subject_dir(samples.path(), "alice"));
    assert_eq!(sources.len(), 2);
    assert!(supervisor.start("alice", sources).unwrap());

    thread::sleep(Duration::from_millis(150));
    assert!(supervisor.stop("alice"));
    let at_stop = store.reading_count();

    let report = supervisor.join("alice").expect("feeder report");
    assert_eq!(supervisor.state("alice"), FeederState::Stopped);
    let at_exit = store.reading_count();
    assert!(at_exit - at_stop <= 2, "{} readings after stop", at_exit - at_stop);
    assert_eq!(report.ingested as usize, at_exit);

    // Nothing arrives once the feeder is stopped
    thread::sleep(Duration::from_millis(100));
    assert_eq!(store.reading_count(), at_exit);
}

#[test]
fn test_exhausted_sources_are_skipped() {
    let samples = tempfile::tempdir().unwrap();
    write_samples(
        samples.path(),
        "alice",
        &[
            ("wrist_hr.csv", "timestamp,value\n1,70\n2,71\n".to_string()),
            (
                "wrist_skin_temperature.csv",
                "timestamp,value\n1,36.1\n2,36.2\n3,36.3\n4,36.4\n5,36.5\n".to_string(),
            ),
        ],
    );

    let (store, monitor) = pipeline();
    let supervisor = FeederSupervisor::new(monitor, Duration::from_millis(5));
    supervisor.start_all(samples.path()).unwrap();

    thread::sleep(Duration::from_millis(200));
    assert_eq!(store.reading_count(), 7);
    // An exhausted feeder idles until stopped
    assert_eq!(supervisor.state("alice"), FeederState::Running);

    let hr = store
        .query_readings("alice", SensorKind::Hr, synheart_vitals_agent::Order::OldestFirst, 10)
        .unwrap();
    assert_eq!(hr.iter().map(|r| r.value).collect::<Vec<_>>(), vec![70.0, 71.0]);

    let reports = supervisor.shutdown();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].ingested, 7);
}

#[test]
fn test_unparseable_lines_are_skipped() {
    let samples = tempfile::tempdir().unwrap();
    write_samples(
        samples.path(),
        "alice",
        &[(
            "wrist_hr.csv",
            "timestamp,value\n1,70\nnot-a-number\n\n3,72\n2024-01-01T00:00:00,73\n".to_string(),
        )],
    );

    let (store, monitor) = pipeline();
    let supervisor = FeederSupervisor::new(monitor, Duration::from_millis(5));
    supervisor.start_all(samples.path()).unwrap();
    thread::sleep(Duration::from_millis(200));

    let reports = supervisor.shutdown();
    assert_eq!(reports[0].skipped, 2);
    assert_eq!(reports[0].ingested, 3);

    let values: Vec<f64> = store
        .subject_readings("alice", 10)
        .unwrap()
        .iter()
        .map(|r| r.value)
        .collect();
    assert!(values.contains(&70.0));
    assert!(values.contains(&72.0));
    // Bad timestamp falls back to the wall clock
    assert!(values.contains(&73.0));
}

#[test]
fn test_start_all_is_idempotent() {
    let samples = tempfile::tempdir().unwrap();
    for subject in ["bob", "alice"] {
        write_samples(samples.path(), subject, &[("wrist_hr.csv", long_series(1000))]);
    }

    let (_store, monitor) = pipeline();
    let supervisor = FeederSupervisor::new(monitor, Duration::from_millis(20));

    let started = supervisor.start_all(samples.path()).unwrap();
    assert_eq!(started, vec!["alice".to_string(), "bob".to_string()]);
    assert!(supervisor.start_all(samples.path()).unwrap().is_empty());

    let mut started_events = 0;
    while let Ok(event) = supervisor.events().recv_timeout(Duration::from_millis(200)) {
        if let FeederEvent::Started { .. } = event {
            started_events += 1;
        }
    }
    assert_eq!(started_events, 2);

    assert_eq!(supervisor.stop_all(), 2);
    let reports = supervisor.shutdown();
    assert_eq!(reports.len(), 2);
    assert!(supervisor.states().is_empty());
}
