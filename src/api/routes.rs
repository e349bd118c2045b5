//! API route definitions
//!
//! Organizes endpoints for the controller dashboard:
//! - /api/v1/health  - Feed and callback health
//! - /api/v1/state   - Per-line last-known outputs
//! - /api/v1/command - Manual speed command
//! - /api/v1/export  - Control log CSV export

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

/// Create all API routes for the dashboard.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/state", get(handlers::get_state))
        .route("/command", post(handlers::post_command))
        .route("/export", get(handlers::get_export))
        .with_state(state)
}

/// Legacy health endpoint at root level.
pub fn legacy_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}
