// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation model manager for loading, warming up and sharing the model

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::vision::segmentation::{PointSegmenter, SamSegmentationModel};

/// Configuration for loading the segmentation model
#[derive(Debug, Clone)]
pub struct SegmentationModelConfig {
    /// Path to the model directory (optional)
    pub model_dir: Option<PathBuf>,
    /// Encoder file name inside `model_dir`
    pub encoder_file: String,
    /// Decoder file name inside `model_dir`
    pub decoder_file: String,
    /// Minimum predicted IoU for a detection
    pub confidence_threshold: f32,
    /// Minimum mask area in pixels
    pub min_mask_area: usize,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Run one dummy inference after loading
    pub warm_up: bool,
}

impl Default for SegmentationModelConfig {
    fn default() -> Self {
        Self {
            model_dir: Some(PathBuf::from("./models/sam2.1-tiny-onnx")),
            encoder_file: "encoder.onnx".to_string(),
            decoder_file: "decoder.onnx".to_string(),
            confidence_threshold: 0.5,
            min_mask_area: 16,
            intra_threads: 4,
            warm_up: true,
        }
    }
}

/// Information about the segmentation model
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationModelInfo {
    /// Model name
    pub name: String,
    /// Model type
    pub model_type: String,
    /// Whether the model is available
    pub available: bool,
}

/// Manager for the shared segmentation model
///
/// One model instance serves every request. A model that fails to load is
/// logged and left unavailable so the server can still start.
pub struct SegmentationModelManager {
    segmenter: Option<Arc<dyn PointSegmenter>>,
}

impl SegmentationModelManager {
    /// Load (and optionally warm up) the model described by `config`
    pub async fn new(config: SegmentationModelConfig) -> anyhow::Result<Self> {
        let segmenter: Option<Arc<dyn PointSegmenter>> = if let Some(ref dir) = config.model_dir {
            let encoder_path = dir.join(&config.encoder_file);
            let decoder_path = dir.join(&config.decoder_file);

            match SamSegmentationModel::new(&encoder_path, &decoder_path, config.intra_threads).await
            {
                Ok(model) => {
                    let model = model
                        .with_confidence_threshold(config.confidence_threshold)
                        .with_min_mask_area(config.min_mask_area);
                    tracing::info!("✅ Segmentation model loaded from {}", dir.display());

                    if config.warm_up {
                        tracing::info!("Warming up model...");
                        let warm = model.clone();
                        match tokio::task::spawn_blocking(move || warm.warm_up()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::warn!("⚠️ Model warm-up failed: {:#}", e),
                            Err(e) => tracing::warn!("⚠️ Model warm-up task failed: {}", e),
                        }
                    }

                    Some(Arc::new(model))
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Failed to load segmentation model from {}: {}",
                        dir.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self { segmenter })
    }

    /// Wrap an already constructed segmenter
    pub fn with_segmenter(segmenter: Arc<dyn PointSegmenter>) -> Self {
        Self {
            segmenter: Some(segmenter),
        }
    }

    /// A manager with no model loaded
    pub fn empty() -> Self {
        Self { segmenter: None }
    }

    /// Get the segmenter if available
    pub fn get_segmenter(&self) -> Option<Arc<dyn PointSegmenter>> {
        self.segmenter.clone()
    }

    /// Check if a segmenter is loaded
    pub fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    /// Name of the loaded model, if any
    pub fn model_name(&self) -> Option<String> {
        self.segmenter.as_ref().map(|s| s.name())
    }

    /// List the segmentation model and its availability
    pub fn list_models(&self) -> Vec<SegmentationModelInfo> {
        vec![SegmentationModelInfo {
            name: self.model_name().unwrap_or_else(|| "sam2.1-tiny".to_string()),
            model_type: "segmentation".to_string(),
            available: self.segmenter.is_some(),
        }]
    }
}
