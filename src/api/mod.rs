//! REST API module using Axum
//!
//! Provides HTTP endpoints for the controller dashboard:
//! - `/api/v1/health`  — feed/callback health and uptime
//! - `/api/v1/state`   — per-line last-known outputs and chain state
//! - `/api/v1/command` — manual speed command (same pipeline as the feed)
//! - `/api/v1/export`  — CSV export of the control log
//! - `/health`         — legacy root-level health check

pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `LINEPACE_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development dashboards.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("LINEPACE_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => {
            // No cross-origin allowed — clients are same-origin
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        }
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        // Legacy health endpoint at root level
        .merge(routes::legacy_routes(state))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
