// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for CPU-based object cropping
//!
//! This module provides:
//! - Base64 image decoding and JPEG crop encoding
//! - Point-prompted segmentation via a SAM-style ONNX model
//! - Per-request temporary workspaces

pub mod image_utils;
pub mod model_manager;
pub mod segmentation;
pub mod workspace;

pub use image_utils::{
    crop_to_box, decode_base64_image, decode_image_bytes, detect_format, encode_jpeg,
    image_to_array, to_jpeg_data_uri, ImageError, ImageInfo,
};
pub use model_manager::{SegmentationModelConfig, SegmentationModelInfo, SegmentationModelManager};
pub use segmentation::{DetectionBox, PointLabel, PointPrompt, PointSegmenter};
pub use workspace::{sweep_stale, CleanupReport, RequestWorkspace};
