//! Replay a synthetic heart-rate episode through the pipeline.
//!
//! Run with `cargo run --example replay_demo`.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synheart_vitals_agent::{
    DetectionSettings, FeederEvent, FeederSupervisor, MemoryStore, Monitor,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    // One subject whose heart rate climbs above 120 bpm halfway through
    let samples = tempfile::tempdir()?;
    let subject_dir = samples.path().join("demo-subject");
    fs::create_dir_all(&subject_dir)?;

    let mut hr = String::from("timestamp,value\n");
    let start = 1_700_000_000_000u64;
    for i in 0..40u64 {
        let bpm = if i < 20 { 72 + i % 5 } else { 125 + i % 7 };
        hr.push_str(&format!("{},{}\n", start + i * 1000, bpm));
    }
    fs::write(subject_dir.join("wrist_hr.csv"), hr)?;

    let store = Arc::new(MemoryStore::new());
    let settings = DetectionSettings {
        cooldown_secs: 10,
        ..DetectionSettings::default()
    };
    let monitor = Arc::new(Monitor::new(store.clone(), settings));
    let supervisor = FeederSupervisor::new(monitor.clone(), Duration::from_millis(20));

    let started = supervisor.start_all(samples.path())?;
    println!("Replaying {:?}", started);

    if let Ok(FeederEvent::Started { subject_id, sensors }) =
        supervisor.events().recv_timeout(Duration::from_secs(1))
    {
        println!("{subject_id}: {sensors} sensor(s)");
    }

    thread::sleep(Duration::from_secs(2));
    for report in supervisor.shutdown() {
        println!("{report:?}");
    }

    println!();
    for anomaly in monitor.recent_anomalies(5)? {
        println!(
            "{} {} avg {:.1} > {} at {}",
            anomaly.subject_id,
            anomaly.sensor_kind,
            anomaly.observed_average,
            anomaly.threshold,
            anomaly.timestamp
        );
    }
    println!();
    println!("{}", monitor.counters().summary());

    Ok(())
}
