// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server: shared state, router and serve loop

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::crop::crop_handler;
use crate::config::{CropSettings, ServerConfig};
use crate::version;
use crate::vision::SegmentationModelManager;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub model_manager: Arc<RwLock<Option<Arc<SegmentationModelManager>>>>,
    pub settings: Arc<CropSettings>,
}

impl AppState {
    /// State with no model loaded yet
    pub fn new(settings: CropSettings) -> Self {
        Self {
            model_manager: Arc::new(RwLock::new(None)),
            settings: Arc::new(settings),
        }
    }

    pub fn with_model_manager(settings: CropSettings, manager: SegmentationModelManager) -> Self {
        Self {
            model_manager: Arc::new(RwLock::new(Some(Arc::new(manager)))),
            settings: Arc::new(settings),
        }
    }

    pub async fn set_model_manager(&self, manager: Arc<SegmentationModelManager>) {
        *self.model_manager.write().await = Some(manager);
    }

    pub async fn get_model_manager(&self) -> Option<Arc<SegmentationModelManager>> {
        self.model_manager.read().await.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub model_loaded: bool,
    pub version: String,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = match state.get_model_manager().await {
        Some(manager) => manager.model_name(),
        None => None,
    };
    let model_loaded = model.is_some();

    let (status, issues) = if model_loaded {
        ("healthy", None)
    } else {
        (
            "degraded",
            Some(vec!["Segmentation model not loaded".to_string()]),
        )
    };

    Json(HealthResponse {
        status: status.to_string(),
        issues,
        model,
        model_loaded,
        version: version::VERSION_NUMBER.to_string(),
    })
}

/// GET /version
pub async fn version_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}

/// Build the router
///
/// Only `allowed_origin` may call `/api/*` cross-origin. Bodies above the
/// configured image limit are rejected before reaching the handler.
pub fn create_app(state: AppState, allowed_origin: &str) -> Result<Router> {
    let origin = HeaderValue::from_str(allowed_origin)
        .with_context(|| format!("Invalid CORS origin: {}", allowed_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api = Router::new()
        .route("/crop", post(crop_handler))
        .layer(cors);

    let body_limit = state.settings.max_body_bytes();

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = config.listen_addr()?;
    let app = create_app(state, &config.allowed_origin)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("🚀 Crop server listening on http://{}", addr);
    tracing::info!("   CORS origin: {}", config.allowed_origin);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
