//! API Routes
//!
//! This module organizes all HTTP endpoints for the application:
//! - `/api/sessions` - Session lifecycle, API key and agent setup
//! - `/api/sessions/{id}/dataset` - CSV upload and row pages
//! - `/api/sessions/{id}/queries` - Question dispatch and history
//! - `/api/health` - Health checks
//! - `/` - The single-page UI

pub mod chat;
pub mod files;
pub mod health;
pub mod sessions;
pub mod ui;

use axum::Router;
use tower_http::trace::TraceLayer;
use crate::middleware::apply_cors;
use crate::models::AppState;
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");
    let origins = state.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .merge(sessions::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(chat::router(state.clone()))
        .merge(health::router(state));

    let app = Router::new()
        .merge(api_router)
        .merge(ui::router())
        .layer(TraceLayer::new_for_http());

    apply_cors(app, &origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::tests::FakeFactory;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::with_factory(Config::default(), Arc::new(FakeFactory::default()));
        create_router(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, filename: &str, content: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            f = filename,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(
            app,
            Request::builder().method("POST").uri("/api/sessions").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_full_flow_upload_key_query() {
        let app = app();
        let id = new_session(&app).await;

        let (status, body) = send(&app, upload_request(&format!("/api/sessions/{}/dataset", id), "cars.csv", "make,mpg\nvw,30\nbmw,25\nkia,33")).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["dataset"]["rows"], 3);
        assert_eq!(body["dataset"]["columns"], 2);
        assert_eq!(body["agent"]["status"], "not_initialized");

        let (status, body) = send(&app, json_request("PUT", &format!("/api/sessions/{}/api-key", id), serde_json::json!({"api_key": "k1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        let (status, body) = send(&app, json_request("POST", &format!("/api/sessions/{}/queries", id), serde_json::json!({"query": "best mpg?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "answered");
        assert_eq!(body["status"]["text"], "k1@cars.csv -> best mpg?");

        let (_, history) = send(&app, Request::builder().uri(format!("/api/sessions/{}/history", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(history.as_array().unwrap().len(), 1);

        let (_, rows) = send(&app, Request::builder().uri(format!("/api/sessions/{}/dataset/rows?offset=1&limit=1", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(rows["rows"][0][0], "bmw");
        assert_eq!(rows["total_rows"], 3);
    }

    #[tokio::test]
    async fn test_failed_query_returns_resolved_entry() {
        let app = app();
        let id = new_session(&app).await;
        send(&app, upload_request(&format!("/api/sessions/{}/dataset", id), "cars.csv", "make,mpg\nvw,30")).await;
        send(&app, json_request("PUT", &format!("/api/sessions/{}/api-key", id), serde_json::json!({"api_key": "k1"}))).await;

        let (status, body) = send(&app, json_request("POST", &format!("/api/sessions/{}/queries", id), serde_json::json!({"query": "please fail"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "failed");
        assert!(body["status"]["text"].as_str().unwrap().contains("cannot do that"));

        let (_, summary) = send(&app, Request::builder().uri(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(summary["history_len"], 1);
        assert_eq!(summary["busy"], false);
    }

    #[tokio::test]
    async fn test_query_without_agent_is_conflict() {
        let app = app();
        let id = new_session(&app).await;
        let (status, body) = send(&app, json_request("POST", &format!("/api/sessions/{}/queries", id), serde_json::json!({"query": "hello"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "no_agent");
    }

    #[tokio::test]
    async fn test_malformed_upload_is_reported() {
        let app = app();
        let id = new_session(&app).await;
        let (status, body) = send(&app, upload_request(&format!("/api/sessions/{}/dataset", id), "bad.csv", "a,b\n1,2,3")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "file_parse");

        let (_, summary) = send(&app, Request::builder().uri(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        assert!(summary["dataset"].is_null());
    }

    #[tokio::test]
    async fn test_temperature_out_of_range_is_rejected() {
        let app = app();
        let id = new_session(&app).await;
        let (status, body) = send(&app, json_request("POST", &format!("/api/sessions/{}/agent", id), serde_json::json!({"temperature": 1.5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_session_and_delete() {
        let app = app();
        let missing = uuid::Uuid::new_v4();
        let (status, _) = send(&app, Request::builder().uri(format!("/api/sessions/{}", missing)).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = new_session(&app).await;
        let (status, _) = send(&app, Request::builder().method("DELETE").uri(format!("/api/sessions/{}", id)).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, health) = send(&app, Request::builder().uri("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 0);
    }
}
