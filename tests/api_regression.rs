//! API regression tests
//!
//! Route-level tests of the dashboard API using `tower::ServiceExt::oneshot`,
//! covering the health/state/command/export endpoints and their error paths.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use linepace::api::{create_app, ApiState};
use linepace::config::ControlSettings;
use linepace::control::ControlPipeline;
use linepace::ingest::BusHealth;
use linepace::storage::ControlLogStore;

fn test_state(store: Option<ControlLogStore>) -> ApiState {
    ApiState::new(
        Arc::new(ControlPipeline::new(ControlSettings::default())),
        store,
        None,
        Arc::new(BusHealth::default()),
        false,
    )
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn command_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/command")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_shape_and_feed_state() {
    let app = create_app(test_state(None));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["bus_connected"], false);
    assert_eq!(json["callback_enabled"], false);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn legacy_health_endpoint_still_serves() {
    let app = create_app(test_state(None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn command_round_trips_through_pipeline() {
    let app = create_app(test_state(None));

    let response = app
        .oneshot(command_request(
            r#"{"line_id":"LINE-01","speed":50.0}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "valid");
    assert_eq!(json["line_id"], "LINE-01");
    let speed = json["speed_used"].as_f64().unwrap();
    assert!((20.0..=80.0).contains(&speed));
    let voltage = json["voltage"].as_f64().unwrap();
    assert!((0.0..=10.0).contains(&voltage));
}

#[tokio::test]
async fn command_rejects_negative_speed() {
    let app = create_app(test_state(None));
    let response = app
        .oneshot(command_request(r#"{"line_id":"L1","speed":-5.0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn command_rejects_blank_line_id() {
    let app = create_app(test_state(None));
    let response = app
        .oneshot(command_request(r#"{"line_id":"","speed":50.0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn state_lists_lines_after_commands() {
    let state = test_state(None);
    let app = create_app(state);

    // Two commands on different lines
    for line in ["A", "B"] {
        let response = app
            .clone()
            .oneshot(command_request(&format!(
                r#"{{"line_id":"{line}","speed":40.0}}"#
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["lines"].as_array().unwrap().len(), 2);

    // Filtered by line
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/state?line_id=A")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    let lines = json["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["line_id"], "A");
    assert!(lines[0]["last_voltage"].is_number());
}

#[tokio::test]
async fn export_returns_csv_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let store = ControlLogStore::open(dir.path().join("log.db")).unwrap();
    let app = create_app(test_state(Some(store)));

    // Produce one record through the command path
    let response = app
        .clone()
        .oneshot(command_request(r#"{"line_id":"L1","speed":50.0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/csv"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "id,line_id,ct_seconds,filtered_ct_seconds,voltage,speed,timestamp"
    );
    assert!(lines.next().unwrap().contains(",L1,"));
}

#[tokio::test]
async fn export_without_store_is_unavailable() {
    let app = create_app(test_state(None));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
