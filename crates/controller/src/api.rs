//! HTTP API for health checks, Prometheus metrics and operator actions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sched_lib::{
    controller::SharedReport,
    health::{ComponentStatus, HealthRegistry},
    tracker::{AuditEntry, ChunkRecord, ChunkState, TrackerSummary},
    JobResources, RiskLevel, Sample, SampleStatus, SchedError, SharedTracker, Submitter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub tracker: SharedTracker,
    pub report: SharedReport,
    pub submitter: Arc<Submitter>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        tracker: SharedTracker,
        report: SharedReport,
        submitter: Arc<Submitter>,
    ) -> Self {
        Self {
            health_registry,
            tracker,
            report,
            submitter,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps scheduling errors onto HTTP statuses
pub struct ApiError(SchedError);

impl From<SchedError> for ApiError {
    fn from(e: SchedError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SchedError::UnknownSample(_) | SchedError::UnknownChunk(_) => StatusCode::NOT_FOUND,
            SchedError::ChunkConflict { .. } | SchedError::StatusUpdateConflict { .. } => {
                StatusCode::CONFLICT
            }
            SchedError::Scheduler(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "Operator request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Chunk record without its member list
#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkView {
    pub chunk_id: String,
    pub state: ChunkState,
    pub job_id: Option<String>,
    pub array_size: usize,
    pub excluded: usize,
    pub resources: JobResources,
    pub success_probability: f64,
    pub risk: RiskLevel,
    pub note: Option<String>,
}

impl From<&ChunkRecord> for ChunkView {
    fn from(chunk: &ChunkRecord) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            state: chunk.state,
            job_id: chunk.job_id.clone(),
            array_size: chunk.sample_ids.len(),
            excluded: chunk.excluded.len(),
            resources: chunk.resources.clone(),
            success_probability: chunk.success_probability,
            risk: chunk.risk,
            note: chunk.note.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub summary: TrackerSummary,
    pub chunks: Vec<ChunkView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SampleResponse {
    pub sample: Sample,
    pub history: Vec<AuditEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ResetParams {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub sample_id: String,
    pub previous: SampleStatus,
    pub status: SampleStatus,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest control cycle report
async fn assessment(State(state): State<Arc<AppState>>) -> Response {
    match state.report.read().await.as_ref() {
        Some(report) => Json(report.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "no control cycle has completed yet".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let tracker = state.tracker.read().await;
    Json(StatusResponse {
        summary: tracker.summary(),
        chunks: tracker.chunks().iter().map(ChunkView::from).collect(),
    })
}

async fn sample(
    State(state): State<Arc<AppState>>,
    Path(sample_id): Path<String>,
) -> Result<Json<SampleResponse>, ApiError> {
    let tracker = state.tracker.read().await;
    let sample = tracker
        .sample(&sample_id)
        .cloned()
        .ok_or_else(|| SchedError::UnknownSample(sample_id.clone()))?;
    let history = tracker.history_of(&sample_id).into_iter().cloned().collect();

    Ok(Json(SampleResponse { sample, history }))
}

/// Administrative reset of a sample to pending
async fn reset_sample(
    State(state): State<Arc<AppState>>,
    Path(sample_id): Path<String>,
    Query(params): Query<ResetParams>,
) -> Result<Json<ResetResponse>, ApiError> {
    let reason = params.reason.unwrap_or_else(|| "operator reset".to_string());
    let previous = state
        .tracker
        .write()
        .await
        .admin_reset(&sample_id, &reason)?;

    Ok(Json(ResetResponse {
        sample_id,
        previous,
        status: SampleStatus::Pending,
    }))
}

/// Withdraw a planned chunk or kill a submitted one
async fn cancel_chunk(
    State(state): State<Arc<AppState>>,
    Path(chunk_id): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state
        .submitter
        .cancel_chunk(&state.tracker, &chunk_id)
        .await?;

    info!(chunk_id = %chunk_id, outcome = ?outcome, "Chunk cancelled by operator");
    Ok(Json(outcome).into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/assessment", get(assessment))
        .route("/api/v1/status", get(status))
        .route("/api/v1/samples/:id", get(sample))
        .route("/api/v1/samples/:id/reset", post(reset_sample))
        .route("/api/v1/chunks/:id/cancel", post(cancel_chunk))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
