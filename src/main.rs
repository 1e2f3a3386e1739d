// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use clap::Parser;
use fabstir_object_crop::{
    api::{start_server, AppState},
    config::ServerConfig,
    version,
    vision::{sweep_stale, SegmentationModelManager},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ort=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::parse();
    config.validate()?;

    tracing::info!("📦 {}", version::get_version_string());
    tracing::info!("   Build: {}", version::VERSION);

    // Clear workspaces left behind by a previous process
    let report = sweep_stale(&config.temp_dir)?;
    if report.files_removed + report.dirs_removed > 0 {
        tracing::info!(
            "Removed {} stale files and {} stale directories from {}",
            report.files_removed,
            report.dirs_removed,
            config.temp_dir.display()
        );
    }

    tracing::info!("🧠 Loading segmentation model from {}", config.model_dir.display());
    let manager = SegmentationModelManager::new(config.model_config()).await?;
    if !manager.has_segmenter() {
        tracing::warn!("⚠️ Starting without a segmentation model; /api/crop will return 503");
    }

    let state = AppState::new(config.crop_settings());
    state.set_model_manager(Arc::new(manager)).await;

    start_server(&config, state).await
}
