// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Segmentation model manager tests
//!
//! These tests verify that the SegmentationModelManager:
//! - Starts without a model when the files are missing
//! - Wraps an injected segmenter and reports it as available
//! - Loads the real SAM2.1 ONNX pair when present (ignored by default)

use anyhow::Result;
use fabstir_object_crop::vision::{
    segmentation::SamSegmentationModel, DetectionBox, PointPrompt, PointSegmenter,
    SegmentationModelConfig, SegmentationModelManager,
};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

const SAM_MODEL_DIR: &str = "./models/sam2.1-tiny-onnx";

struct FixedSegmenter;

impl PointSegmenter for FixedSegmenter {
    fn name(&self) -> String {
        "fixed".to_string()
    }

    fn segment(&self, _image: &DynamicImage, _prompts: &[PointPrompt]) -> Result<Vec<DetectionBox>> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod model_manager_tests {
    use super::*;

    #[test]
    fn test_default_config_points_at_sam_tiny() {
        let config = SegmentationModelConfig::default();
        let dir = config.model_dir.unwrap();
        assert!(dir.to_string_lossy().contains("sam2.1-tiny"));
        assert_eq!(config.encoder_file, "encoder.onnx");
        assert_eq!(config.decoder_file, "decoder.onnx");
    }

    #[tokio::test]
    async fn test_missing_model_is_not_fatal() {
        let config = SegmentationModelConfig {
            model_dir: Some(PathBuf::from("/nonexistent/sam2.1")),
            warm_up: false,
            ..Default::default()
        };

        let manager = SegmentationModelManager::new(config).await.unwrap();
        assert!(!manager.has_segmenter());
        assert!(manager.model_name().is_none());

        let models = manager.list_models();
        assert_eq!(models.len(), 1);
        assert!(!models[0].available);
    }

    #[tokio::test]
    async fn test_sam_model_not_found_error() {
        let result = SamSegmentationModel::new(
            "/nonexistent/encoder.onnx",
            "/nonexistent/decoder.onnx",
            1,
        )
        .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"), "unexpected error: {}", err);
    }

    #[test]
    fn test_injected_segmenter() {
        let manager = SegmentationModelManager::with_segmenter(Arc::new(FixedSegmenter));
        assert!(manager.has_segmenter());
        assert_eq!(manager.model_name().as_deref(), Some("fixed"));

        let segmenter = manager.get_segmenter().unwrap();
        let boxes = segmenter
            .segment(&DynamicImage::new_rgb8(4, 4), &[PointPrompt::foreground(1.0, 1.0)])
            .unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_empty_manager() {
        let manager = SegmentationModelManager::empty();
        assert!(manager.get_segmenter().is_none());
        assert_eq!(manager.list_models()[0].model_type, "segmentation");
    }

    #[tokio::test]
    #[ignore = "requires SAM2.1 ONNX files in ./models/sam2.1-tiny-onnx"]
    async fn test_real_model_loads_and_warms_up() {
        let config = SegmentationModelConfig {
            model_dir: Some(PathBuf::from(SAM_MODEL_DIR)),
            ..Default::default()
        };

        let manager = SegmentationModelManager::new(config).await.unwrap();
        assert!(manager.has_segmenter());
        assert_eq!(manager.model_name().as_deref(), Some("sam2.1-tiny"));
    }
}
