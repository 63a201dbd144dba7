//! Feeder supervisor: one ingestion loop per subject.
//!
//! Each feeder runs on its own thread. Every round it pulls at most one
//! sample from each of the subject's sensor sources, in a fixed sensor order,
//! pushes it through the monitor and then sleeps for the feed interval. Stop
//! is cooperative: the flag is checked at the top of each round, so a round
//! in progress always completes.

use super::source::{discover_subjects, open_subject_sources, subject_dir, SensorSources, SourceItem};
use crate::monitor::Monitor;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Lifecycle of a subject's feeder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FeederState {
    Idle = 0,
    Running = 1,
    StopRequested = 2,
    Stopped = 3,
}

impl FeederState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => FeederState::Running,
            2 => FeederState::StopRequested,
            3 => FeederState::Stopped,
            _ => FeederState::Idle,
        }
    }
}

/// What a feeder did before it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederReport {
    pub subject_id: String,
    pub rounds: u64,
    pub ingested: u64,
    /// Lines that could not be parsed
    pub skipped: u64,
    /// Samples refused by validation or lost to store errors
    pub failed: u64,
}

/// Lifecycle notifications published by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum FeederEvent {
    Started { subject_id: String, sensors: usize },
    Stopped(FeederReport),
}

/// Errors raised by feeder control operations.
#[derive(Debug, Error)]
pub enum FeederError {
    #[error("Failed to list sample directory: {0}")]
    Discovery(#[source] std::io::Error),

    #[error("Failed to spawn feeder thread: {0}")]
    Spawn(#[source] std::io::Error),
}

struct FeederHandle {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<FeederReport>>,
}

impl FeederHandle {
    fn state(&self) -> FeederState {
        FeederState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn is_live(&self) -> bool {
        matches!(self.state(), FeederState::Running | FeederState::StopRequested)
    }

    /// The state moves to `StopRequested` before the flag is raised, so the
    /// loop cannot reach `Stopped` in between.
    fn request_stop(&self) -> bool {
        let requested = self
            .state
            .compare_exchange(
                FeederState::Running as u8,
                FeederState::StopRequested as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if requested {
            self.stop.store(true, Ordering::SeqCst);
        }
        requested
    }

    fn join(&mut self) -> Option<FeederReport> {
        let thread = self.thread.take()?;
        join_feeder(thread, &self.state)
    }
}

/// Join a feeder thread. A panicked feeder is marked `Stopped` so it can be
/// started again.
fn join_feeder(thread: JoinHandle<FeederReport>, state: &AtomicU8) -> Option<FeederReport> {
    let name = thread.thread().name().unwrap_or("feeder").to_string();
    match thread.join() {
        Ok(report) => Some(report),
        Err(_) => {
            tracing::error!("Thread {} panicked", name);
            state.store(FeederState::Stopped as u8, Ordering::SeqCst);
            None
        }
    }
}

/// Owns the per-subject feeder threads.
pub struct FeederSupervisor {
    monitor: Arc<Monitor>,
    interval: Duration,
    feeders: Mutex<HashMap<String, FeederHandle>>,
    events_tx: Sender<FeederEvent>,
    events_rx: Receiver<FeederEvent>,
}

impl FeederSupervisor {
    pub fn new(monitor: Arc<Monitor>, interval: Duration) -> Self {
        let (events_tx, events_rx) = bounded(1024);
        Self {
            monitor,
            interval,
            feeders: Mutex::new(HashMap::new()),
            events_tx,
            events_rx,
        }
    }

    fn feeders(&self) -> MutexGuard<'_, HashMap<String, FeederHandle>> {
        self.feeders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver for lifecycle events.
    pub fn events(&self) -> &Receiver<FeederEvent> {
        &self.events_rx
    }

    /// Start a feeder for `subject_id` over `sources`.
    ///
    /// Returns `false` without touching anything when the subject already has
    /// a live feeder, including one that is still winding down after a stop.
    pub fn start(&self, subject_id: &str, sources: SensorSources) -> Result<bool, FeederError> {
        let mut feeders = self.feeders();
        if let Some(existing) = feeders.get_mut(subject_id) {
            if existing.is_live() {
                return Ok(false);
            }
            // Reap the finished thread before replacing it
            existing.join();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(FeederState::Running as u8));
        let worker = FeederLoop {
            subject_id: subject_id.to_string(),
            sources,
            monitor: self.monitor.clone(),
            interval: self.interval,
            stop: stop.clone(),
            state: state.clone(),
            events: self.events_tx.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("feeder-{subject_id}"))
            .spawn(move || worker.run())
            .map_err(FeederError::Spawn)?;

        feeders.insert(
            subject_id.to_string(),
            FeederHandle {
                stop,
                state,
                thread: Some(thread),
            },
        );
        Ok(true)
    }

    /// Start feeders for every subject directory under `samples_dir`.
    ///
    /// Returns the subjects that were started; already-running ones are skipped.
    pub fn start_all(&self, samples_dir: &Path) -> Result<Vec<String>, FeederError> {
        let subjects = discover_subjects(samples_dir).map_err(FeederError::Discovery)?;
        let mut started = Vec::new();
        for subject_id in subjects {
            if self.state(&subject_id) == FeederState::Running {
                continue;
            }
            let sources = open_subject_sources(&subject_dir(samples_dir, &subject_id));
            if self.start(&subject_id, sources)? {
                started.push(subject_id);
            }
        }
        Ok(started)
    }

    /// Ask a subject's feeder to stop. Returns `true` if it was running.
    pub fn stop(&self, subject_id: &str) -> bool {
        self.feeders()
            .get(subject_id)
            .map(FeederHandle::request_stop)
            .unwrap_or(false)
    }

    /// Ask every feeder to stop. Returns how many were running.
    pub fn stop_all(&self) -> usize {
        self.feeders()
            .values()
            .filter(|handle| handle.request_stop())
            .count()
    }

    pub fn state(&self, subject_id: &str) -> FeederState {
        self.feeders()
            .get(subject_id)
            .map(FeederHandle::state)
            .unwrap_or(FeederState::Idle)
    }

    /// State of every feeder started so far.
    pub fn states(&self) -> BTreeMap<String, FeederState> {
        self.feeders()
            .iter()
            .map(|(subject, handle)| (subject.clone(), handle.state()))
            .collect()
    }

    /// Wait for a subject's feeder thread to exit.
    ///
    /// Blocks until the feeder observes a stop request.
    pub fn join(&self, subject_id: &str) -> Option<FeederReport> {
        let (thread, state) = {
            let mut feeders = self.feeders();
            let handle = feeders.get_mut(subject_id)?;
            (handle.thread.take()?, handle.state.clone())
        };
        join_feeder(thread, &state)
    }

    /// Stop every feeder and wait for all of them to exit.
    pub fn shutdown(&self) -> Vec<FeederReport> {
        self.stop_all();
        let mut handles: Vec<FeederHandle> = self.feeders().drain().map(|(_, h)| h).collect();
        handles.iter_mut().filter_map(FeederHandle::join).collect()
    }
}

impl Drop for FeederSupervisor {
    fn drop(&mut self) {
        for handle in self.feeders().values() {
            handle.request_stop();
        }
    }
}

/// State moved onto a feeder thread.
struct FeederLoop {
    subject_id: String,
    sources: SensorSources,
    monitor: Arc<Monitor>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    events: Sender<FeederEvent>,
}

impl FeederLoop {
    fn run(mut self) -> FeederReport {
        tracing::info!(
            "Feeder started for {} ({} sensors)",
            self.subject_id,
            self.sources.len()
        );
        self.publish(FeederEvent::Started {
            subject_id: self.subject_id.clone(),
            sensors: self.sources.len(),
        });

        let mut report = FeederReport {
            subject_id: self.subject_id.clone(),
            ..FeederReport::default()
        };
        let mut exhausted = vec![false; self.sources.len()];

        while !self.stop.load(Ordering::SeqCst) {
            report.rounds += 1;

            for (idx, (sensor, source)) in self.sources.iter_mut().enumerate() {
                if exhausted[idx] {
                    continue;
                }
                match source.next_item() {
                    SourceItem::Sample(sample) => {
                        match self.monitor.ingest_reading(
                            &self.subject_id,
                            *sensor,
                            sample.timestamp,
                            sample.value,
                        ) {
                            Ok(_) => report.ingested += 1,
                            Err(e) => {
                                tracing::warn!(
                                    "Feeder {} could not ingest {} sample: {}",
                                    self.subject_id,
                                    sensor,
                                    e
                                );
                                report.failed += 1;
                            }
                        }
                    }
                    SourceItem::Skipped(line) => {
                        tracing::warn!(
                            "Feeder {} skipped unparseable {} line: {:?}",
                            self.subject_id,
                            sensor,
                            line
                        );
                        report.skipped += 1;
                    }
                    SourceItem::Exhausted => {
                        tracing::debug!("Feeder {}: {} source exhausted", self.subject_id, sensor);
                        exhausted[idx] = true;
                    }
                }
            }

            thread::sleep(self.interval);
        }

        self.state.store(FeederState::Stopped as u8, Ordering::SeqCst);
        tracing::info!(
            "Feeder stopped for {} after {} rounds ({} ingested)",
            self.subject_id,
            report.rounds,
            report.ingested
        );
        self.publish(FeederEvent::Stopped(report.clone()));
        report
    }

    fn publish(&self, event: FeederEvent) {
        if let Err(TrySendError::Full(_)) = self.events.try_send(event) {
            tracing::debug!("Feeder event queue full, dropping event");
        }
    }
}
