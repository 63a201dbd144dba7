//! Synheart Vitals Agent CLI
//!
//! Wearable telemetry ingestion with moving-average anomaly alerts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_vitals_agent::{
    config::Config,
    core::{format_local, now_seconds},
    feeder::{open_subject_sources, subject_dir, FeederEvent, FeederReport, FeederSupervisor},
    Monitor, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-vitals")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Wearable telemetry ingestion with anomaly alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Replay sample files in the foreground until Ctrl+C
    Feed {
        /// Only feed this subject
        #[arg(long)]
        subject: Option<String>,

        /// Directory holding one folder of wrist_*.csv files per subject
        #[arg(long)]
        samples_dir: Option<PathBuf>,

        /// Seconds between feeder rounds
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Ingest a single reading
    Ingest {
        /// Subject identifier
        subject: String,

        /// Sensor kind (hr, temp, eda, bvp, acc, ibi)
        sensor: String,

        /// Reading value
        value: f64,

        /// Epoch timestamp in seconds or milliseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<f64>,
    },

    /// Show the most recent anomalies
    Anomalies {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Summarize readings over the last days
    Summary {
        #[arg(long, default_value = "7")]
        days: u32,

        /// Restrict to one subject
        #[arg(long)]
        subject: Option<String>,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
        Commands::Feed {
            subject,
            samples_dir,
            interval,
        } => {
            cmd_feed(subject, samples_dir, interval);
        }
        Commands::Ingest {
            subject,
            sensor,
            value,
            timestamp,
        } => {
            cmd_ingest(&subject, &sensor, value, timestamp);
        }
        Commands::Anomalies { limit } => {
            cmd_anomalies(limit);
        }
        Commands::Summary { days, subject } => {
            cmd_summary(days, subject.as_deref());
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn open_monitor(config: &Config) -> Monitor {
    match Monitor::from_config(config) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error initializing pipeline: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: Option<u16>) {
    use synheart_vitals_agent::server::{spawn, ServerConfig};

    let mut config = load_config();
    if let Some(port) = port {
        config.server_port = port;
    }

    println!("Synheart Vitals Agent v{VERSION}");
    println!();
    println!("  Database: {:?}", config.database_path);
    println!("  Samples: {:?}", config.samples_dir);
    println!("  Window size: {}", config.window_size);
    println!("  Cooldown: {}s", config.cooldown_secs);
    println!();

    let monitor = Arc::new(open_monitor(&config));
    let server_config = ServerConfig::from_config(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let server = match spawn(server_config, monitor.clone()).await {
            Ok(server) => server,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

        println!("Listening on http://{}", server.addr);
        println!("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }

        println!();
        println!("Shutting down...");
        let _ = server.shutdown.send(());
        // Feeders finish their current round before exiting
        if let Err(e) = server.finished.await {
            eprintln!("Error during shutdown: {e}");
        }

        println!();
        println!("{}", monitor.counters().summary());
    });
}

fn cmd_feed(subject: Option<String>, samples_dir: Option<PathBuf>, interval: Option<f64>) {
    let mut config = load_config();
    if let Some(dir) = samples_dir {
        config.samples_dir = dir;
    }
    if let Some(secs) = interval {
        if !secs.is_finite() || secs <= 0.0 {
            eprintln!("Error: --interval must be a positive number of seconds");
            std::process::exit(1);
        }
        config.feed_interval = Duration::from_secs_f64(secs);
    }

    println!("Synheart Vitals Agent v{VERSION}");
    println!();
    println!("Feeding from {:?}", config.samples_dir);
    println!("  Interval: {:.2}s", config.feed_interval.as_secs_f64());
    println!("  Window size: {}", config.window_size);
    println!();

    let monitor = Arc::new(open_monitor(&config));
    let supervisor = FeederSupervisor::new(monitor.clone(), config.feed_interval);

    let started = match subject {
        Some(subject) => {
            let sources = open_subject_sources(&subject_dir(&config.samples_dir, &subject));
            if sources.is_empty() {
                eprintln!("No sample files found for {subject}");
                std::process::exit(1);
            }
            match supervisor.start(&subject, sources) {
                Ok(_) => vec![subject],
                Err(e) => {
                    eprintln!("Error starting feeder: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => match supervisor.start_all(&config.samples_dir) {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting feeders: {e}");
                std::process::exit(1);
            }
        },
    };

    if started.is_empty() {
        println!("No subjects found in {:?}", config.samples_dir);
        return;
    }

    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    while running.load(Ordering::SeqCst) {
        match supervisor.events().recv_timeout(Duration::from_millis(200)) {
            Ok(FeederEvent::Started { subject_id, sensors }) => {
                println!("Feeding {subject_id} ({sensors} sensors)");
            }
            Ok(FeederEvent::Stopped(report)) => print_report(&report),
            Err(_) => {}
        }
    }

    println!();
    println!("Stopping feeders...");
    for report in supervisor.shutdown() {
        print_report(&report);
    }

    println!();
    println!("{}", monitor.counters().summary());
}

fn print_report(report: &FeederReport) {
    println!(
        "  {}: {} rounds, {} ingested, {} skipped, {} failed",
        report.subject_id, report.rounds, report.ingested, report.skipped, report.failed
    );
}

fn cmd_ingest(subject: &str, sensor: &str, value: f64, timestamp: Option<f64>) {
    let config = load_config();
    let monitor = open_monitor(&config);
    let timestamp = timestamp.unwrap_or_else(now_seconds);

    match monitor.ingest(subject, sensor, timestamp, value) {
        Ok(outcome) => {
            println!(
                "Stored {} {} = {} at {}",
                outcome.reading.subject_id,
                outcome.reading.sensor_kind,
                outcome.reading.value,
                outcome.reading.timestamp
            );
            if let Some(anomaly) = outcome.anomaly {
                println!(
                    "Anomaly: moving average {:.3} above threshold {}",
                    anomaly.observed_average, anomaly.threshold
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(if e.is_validation() { 2 } else { 1 });
        }
    }
}

fn cmd_anomalies(limit: usize) {
    let config = load_config();
    let monitor = open_monitor(&config);
    let tz = config.tz().unwrap_or(chrono_tz::UTC);

    let anomalies = match monitor.recent_anomalies(limit) {
        Ok(anomalies) => anomalies,
        Err(e) => {
            eprintln!("Error reading anomalies: {e}");
            std::process::exit(1);
        }
    };

    if anomalies.is_empty() {
        println!("No anomalies recorded.");
        return;
    }

    println!("Recent anomalies");
    println!("================");
    for anomaly in anomalies {
        println!(
            "{}  {:<10} {:<4} avg {:>10.3} {} (threshold {}, last {})",
            format_local(anomaly.timestamp, tz),
            anomaly.subject_id,
            anomaly.sensor_kind,
            anomaly.observed_average,
            anomaly.sensor_kind.unit(),
            anomaly.threshold,
            anomaly.window_size
        );
    }
}

fn cmd_summary(days: u32, subject: Option<&str>) {
    let config = load_config();
    let monitor = open_monitor(&config);

    let summary = match monitor.summary(subject, days, now_seconds()) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error computing summary: {e}");
            std::process::exit(1);
        }
    };

    println!(
        "Summary for {} over the last {} day(s)",
        subject.unwrap_or("all subjects"),
        days
    );
    println!();
    if summary.sensors.is_empty() {
        println!("No readings in this window.");
        return;
    }
    for (sensor, stats) in &summary.sensors {
        println!(
            "  {:<24} n={:<6} mean={:<10.3} min={:<10.3} max={:.3} {}",
            sensor.label(),
            stats.count,
            stats.mean,
            stats.min,
            stats.max,
            sensor.unit()
        );
    }
    println!();
    println!("Total readings: {}", summary.total);
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }
}
