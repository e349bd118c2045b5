//! API route handlers
//!
//! Request handling logic for all API endpoints. The manual command path
//! feeds the same control pipeline as the bus feed and runs the same sink
//! phase (persistence append + forward dispatch) after the compute phase.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::defaults::STOPPED_LINE_CT_MINUTES;
use crate::control::{ControlError, ControlPipeline, LineSnapshot};
use crate::forward::ForwardHandle;
use crate::ingest::BusHealth;
use crate::storage::ControlLogStore;
use crate::types::CycleTimeSample;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// The control pipeline shared with the ingest task
    pub pipeline: Arc<ControlPipeline>,
    /// Control log storage (absent when running degraded)
    pub store: Option<ControlLogStore>,
    /// Forward dispatch handle (absent when the callback is disabled)
    pub forward: Option<ForwardHandle>,
    /// Feed health shared with the ingest source
    pub bus_health: Arc<BusHealth>,
    /// Whether result forwarding is configured on
    pub callback_enabled: bool,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        pipeline: Arc<ControlPipeline>,
        store: Option<ControlLogStore>,
        forward: Option<ForwardHandle>,
        bus_health: Arc<BusHealth>,
        callback_enabled: bool,
    ) -> Self {
        Self {
            pipeline,
            store,
            forward,
            bus_health,
            callback_enabled,
            started_at: Instant::now(),
        }
    }

    /// Minimal state for route tests: default pipeline, no store, no forward.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(
            Arc::new(ControlPipeline::new(
                crate::config::ControlSettings::default(),
            )),
            None,
            None,
            Arc::new(BusHealth::default()),
            false,
        )
    }
}

// ============================================================================
// Error Responses
// ============================================================================

/// JSON error body: `{ "error": "..." }` with an appropriate status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Validation(msg) => Self::bad_request(msg),
        }
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub bus_connected: bool,
    pub callback_enabled: bool,
    pub lines_tracked: usize,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/v1/health — process and feed health.
pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        bus_connected: state.bus_health.is_connected(),
        callback_enabled: state.callback_enabled,
        lines_tracked: state.pipeline.line_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

// ============================================================================
// State Endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub line_id: Option<String>,
}

/// Per-line state response.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub lines: Vec<LineSnapshot>,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/v1/state — last-known outputs for all lines, or one line via
/// `?line_id=`.
pub async fn get_state(
    State(state): State<ApiState>,
    Query(query): Query<StateQuery>,
) -> Json<StateResponse> {
    let lines = match query.line_id.as_deref() {
        Some(line_id) => state.pipeline.snapshot(line_id).into_iter().collect(),
        None => state.pipeline.snapshot_all(),
    };
    Json(StateResponse {
        lines,
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Command Endpoint
// ============================================================================

/// Manual speed command request.
#[derive(Debug, Deserialize)]
pub struct ManualCommandRequest {
    pub line_id: String,
    /// Requested speed (>= 0). Zero parks the line at minimum speed.
    pub speed: f64,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "manual".to_string()
}

/// Control result response for a manual command.
#[derive(Debug, Serialize)]
pub struct ControlResultResponse {
    pub status: String,
    pub line_id: String,
    pub speed_used: f64,
    pub voltage: f64,
    pub filtered_ct_seconds: f64,
    pub chain_stale: bool,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/v1/command — feed a manual speed command through the pipeline.
///
/// The speed is converted to an equivalent cycle time (`factor / speed`,
/// or a parked 60-minute CT for `speed <= 0`) so manual commands and feed
/// samples share one code path. Negative speeds fail validation.
pub async fn post_command(
    State(state): State<ApiState>,
    Json(request): Json<ManualCommandRequest>,
) -> Result<Json<ControlResultResponse>, ApiError> {
    if request.line_id.trim().is_empty() {
        return Err(ApiError::bad_request("line_id must not be empty"));
    }
    if !request.speed.is_finite() || request.speed < 0.0 {
        return Err(ApiError::bad_request(format!(
            "speed must be >= 0, got {}",
            request.speed
        )));
    }

    let settings = state.pipeline.settings();
    let ct_minutes = if request.speed <= 0.0 {
        STOPPED_LINE_CT_MINUTES
    } else {
        settings.ct_to_speed_factor / request.speed
    };

    let sample = CycleTimeSample {
        line_id: request.line_id.clone(),
        cycle_time_minutes: ct_minutes,
        timestamp: Utc::now(),
    };

    let result = state.pipeline.process(&sample, None)?;

    // Sink phase — after the pipeline lock is released.
    if let Some(store) = &state.store {
        if let Err(e) = store.append(&sample, &result) {
            warn!(line = %result.line_id, error = %e, "Failed to persist manual command result");
        }
    }
    if let Some(forward) = &state.forward {
        forward.dispatch(result.clone());
    }

    tracing::info!(
        line = %result.line_id,
        mode = %request.mode,
        speed = result.speed_used,
        voltage = result.voltage,
        "Processed manual command"
    );

    Ok(Json(ControlResultResponse {
        status: result.status.to_string(),
        line_id: result.line_id,
        speed_used: result.speed_used,
        voltage: result.voltage,
        filtered_ct_seconds: result.filtered_ct_seconds,
        chain_stale: result.chain_stale,
        timestamp: result.applied_at,
    }))
}

// ============================================================================
// Export Endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub line_id: Option<String>,
}

/// GET /api/v1/export — control log as a CSV attachment.
pub async fn get_export(
    State(state): State<ApiState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let Some(store) = &state.store else {
        return Err(ApiError::service_unavailable(
            "control log storage is not available",
        ));
    };

    let csv = store.export_csv(query.line_id.as_deref());
    let filename = match query.line_id.as_deref() {
        Some(line_id) => format!("control_logs_{line_id}.csv"),
        None => "control_logs.csv".to_string(),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        csv,
    )
        .into_response())
}

// ============================================================================
// Tests
// ============================================================================
