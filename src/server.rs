//! HTTP server for reading ingestion, alert history and feeder control.
//!
//! This module provides an HTTP server that:
//! - Accepts readings from external producers via POST /api/sensor_data
//! - Serves recent anomalies, subject readings and window summaries
//! - Starts and stops the per-subject sample feeders
//!
//! # Architecture
//!
//! ```text
//! Producer ──→ POST /api/sensor_data ──→ Monitor ──→ Store / Detector ──→ Notifier
//!                                           ↑
//!                        Feeders ───────────┘  (POST /api/feeders/start)
//! ```
//!
//! The pipeline is synchronous; handlers run it on tokio's blocking pool.

use crate::config::Config;
use crate::core::time::now_seconds;
use crate::core::types::{Anomaly, Reading};
use crate::core::summary::WindowSummary;
use crate::counters::CounterSnapshot;
use crate::error::{IngestError, ValidationError};
use crate::feeder::{FeederState, FeederSupervisor};
use crate::monitor::Monitor;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_ANOMALY_LIMIT: usize = 20;
const DEFAULT_READING_LIMIT: usize = 1000;
const DEFAULT_SUMMARY_DAYS: u32 = 7;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Directory of per-subject sample files for the feeders
    pub samples_dir: PathBuf,
    /// Pause between feeder rounds
    pub feed_interval: Duration,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, samples_dir: PathBuf, feed_interval: Duration) -> Self {
        Self {
            port,
            samples_dir,
            feed_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server_port,
            config.samples_dir.clone(),
            config.feed_interval,
        )
    }
}

/// Shared server state
pub struct ServerState {
    monitor: Arc<Monitor>,
    supervisor: Arc<FeederSupervisor>,
    samples_dir: PathBuf,
}

impl ServerState {
    pub fn new(config: &ServerConfig, monitor: Arc<Monitor>) -> Self {
        let supervisor = Arc::new(FeederSupervisor::new(monitor.clone(), config.feed_interval));
        Self {
            monitor,
            supervisor,
            samples_dir: config.samples_dir.clone(),
        }
    }
}

/// Reading pushed by an external producer.
///
/// The legacy field names `username` and `sensor_kind` are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorDataRequest {
    #[serde(alias = "username")]
    pub subject_id: Option<String>,
    #[serde(alias = "sensor_kind")]
    pub sensor: Option<String>,
    /// Seconds or milliseconds; defaults to now
    pub timestamp: Option<f64>,
    pub value: Option<f64>,
}

/// Acknowledgement for write endpoints
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct AnomaliesResponse {
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub subject_id: String,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Serialize)]
pub struct FeedersResponse {
    pub ok: bool,
    pub feeders: BTreeMap<String, FeederState>,
    /// Subjects affected by the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub counters: CounterSnapshot,
    pub feeders: BTreeMap<String, FeederState>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<u32>,
    pub subject: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            ok: false,
            error: error.to_string(),
        }),
    )
}

fn internal(error: impl Display) -> ApiError {
    tracing::error!("Request failed: {}", error);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, error)
}

/// Run a synchronous pipeline call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(internal)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/sensor_data
///
/// Validation failures and malformed bodies answer 400, store failures 500.
async fn sensor_data(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<SensorDataRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        api_error(
            StatusCode::BAD_REQUEST,
            ValidationError::MalformedPayload(rejection.body_text()),
        )
    })?;

    let subject_id = request.subject_id.unwrap_or_default();
    let sensor = request.sensor.ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            ValidationError::MalformedPayload("missing sensor".to_string()),
        )
    })?;
    let value = request.value.ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            ValidationError::MalformedPayload("missing value".to_string()),
        )
    })?;
    let timestamp = request.timestamp.unwrap_or_else(now_seconds);

    let monitor = state.monitor.clone();
    let result = blocking(move || monitor.ingest(&subject_id, &sensor, timestamp, value)).await?;

    match result {
        Ok(_) => Ok(Json(AckResponse { ok: true })),
        Err(e @ IngestError::Validation(_)) => Err(api_error(StatusCode::BAD_REQUEST, e)),
        Err(e) => Err(internal(e)),
    }
}

/// GET /api/anomalies
async fn anomalies(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<AnomaliesResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ANOMALY_LIMIT);
    let monitor = state.monitor.clone();
    let anomalies = blocking(move || monitor.recent_anomalies(limit))
        .await?
        .map_err(internal)?;
    Ok(Json(AnomaliesResponse { anomalies }))
}

/// GET /api/readings/:subject
async fn readings(
    State(state): State<Arc<ServerState>>,
    Path(subject_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ReadingsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_READING_LIMIT);
    let monitor = state.monitor.clone();
    let subject = subject_id.clone();
    let readings = blocking(move || monitor.subject_readings(&subject, limit))
        .await?
        .map_err(internal)?;
    Ok(Json(ReadingsResponse {
        subject_id,
        readings,
    }))
}

/// GET /api/summary
async fn summary(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<WindowSummary>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_SUMMARY_DAYS);
    let monitor = state.monitor.clone();
    let summary = blocking(move || monitor.summary(query.subject.as_deref(), days, now_seconds()))
        .await?
        .map_err(internal)?;
    Ok(Json(summary))
}

/// POST /api/feeders/start
///
/// Starts a feeder for every subject found in the samples directory. Running
/// feeders are left alone.
async fn start_feeders(State(state): State<Arc<ServerState>>) -> Result<Json<FeedersResponse>, ApiError> {
    let supervisor = state.supervisor.clone();
    let samples_dir = state.samples_dir.clone();
    let started = blocking(move || supervisor.start_all(&samples_dir))
        .await?
        .map_err(internal)?;

    tracing::info!("Started {} feeder(s)", started.len());
    Ok(Json(FeedersResponse {
        ok: true,
        feeders: state.supervisor.states(),
        changed: Some(started),
    }))
}

/// POST /api/feeders/stop
async fn stop_feeders(State(state): State<Arc<ServerState>>) -> Json<FeedersResponse> {
    let stopped: Vec<String> = state
        .supervisor
        .states()
        .into_keys()
        .filter(|subject| state.supervisor.stop(subject))
        .collect();

    tracing::info!("Requested stop for {} feeder(s)", stopped.len());
    Json(FeedersResponse {
        ok: true,
        feeders: state.supervisor.states(),
        changed: Some(stopped),
    })
}

/// GET /api/feeders
async fn feeders(State(state): State<Arc<ServerState>>) -> Json<FeedersResponse> {
    Json(FeedersResponse {
        ok: true,
        feeders: state.supervisor.states(),
        changed: None,
    })
}

/// GET /api/status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        counters: state.monitor.counters().snapshot(),
        feeders: state.supervisor.states(),
    })
}

/// Build the router over a shared state.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sensor_data", post(sensor_data))
        .route("/api/anomalies", get(anomalies))
        .route("/api/readings/:subject", get(readings))
        .route("/api/summary", get(summary))
        .route("/api/feeders", get(feeders))
        .route("/api/feeders/start", post(start_feeders))
        .route("/api/feeders/stop", post(stop_feeders))
        .route("/api/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// A server running on a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    /// Send to begin graceful shutdown.
    pub shutdown: tokio::sync::oneshot::Sender<()>,
    /// Completes once the server has drained and every feeder has joined.
    pub finished: tokio::task::JoinHandle<()>,
}

/// Start the HTTP server on a background task.
///
/// Feeders started through the API are stopped and joined once the shutdown
/// signal has been received.
pub async fn spawn(config: ServerConfig, monitor: Arc<Monitor>) -> anyhow::Result<RunningServer> {
    let state = Arc::new(ServerState::new(&config, monitor));
    let supervisor = state.supervisor.clone();
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Vitals agent server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let finished = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }

        match tokio::task::spawn_blocking(move || supervisor.shutdown()).await {
            Ok(reports) => tracing::info!("Stopped {} feeder(s)", reports.len()),
            Err(e) => tracing::error!("Feeder shutdown failed: {}", e),
        }
    });

    Ok(RunningServer {
        addr: actual_addr,
        shutdown: shutdown_tx,
        finished,
    })
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    monitor: Arc<Monitor>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let server = spawn(config, monitor).await?;
    Ok((server.addr, server.shutdown))
}
