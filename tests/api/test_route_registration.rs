// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Route registration tests
//!
//! These tests verify that:
//! - /api/crop only accepts POST
//! - /health and /version are registered
//! - CORS on /api/* allows exactly the configured origin
//! - Oversized bodies are rejected with 400

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use fabstir_object_crop::{
    api::http_server::{create_app, AppState},
    config::CropSettings,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

const ORIGIN: &str = "http://localhost:5173";

fn app(temp: &TempDir) -> Router {
    let settings = CropSettings {
        temp_dir: temp.path().to_path_buf(),
        max_image_bytes: 1024,
        ..Default::default()
    };
    create_app(AppState::new(settings), ORIGIN).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[cfg(test)]
mod route_registration_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_route_registered() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["modelLoaded"], false);
        assert_eq!(json["status"], "degraded");
    }

    #[tokio::test]
    async fn test_version_route_registered() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .uri("/version")
            .body(Body::empty())
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["features"].is_array());
    }

    #[tokio::test]
    async fn test_crop_rejects_get() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/crop")
            .body(Body::empty())
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/segment")
            .body(Body::empty())
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight_from_allowed_origin() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/crop")
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            ORIGIN
        );
        let methods = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("POST"));
    }

    #[tokio::test]
    async fn test_other_origin_gets_no_cors_header() {
        let temp = TempDir::new().unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/crop")
            .header(header::ORIGIN, "http://evil.example")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let temp = TempDir::new().unwrap();
        let image = "A".repeat(200 * 1024);
        let body = format!(r#"{{"x": 1, "y": 1, "image": "{}"}}"#, image);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/crop")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app(&temp).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid request body");
    }
}
