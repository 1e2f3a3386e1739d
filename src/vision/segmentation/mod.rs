// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Point-prompted segmentation
//!
//! Components:
//! - `preprocessing` - Image and prompt tensors for the encoder/decoder
//! - `postprocess` - Mask selection and bounding box extraction
//! - `sam` - SAM-style ONNX encoder + decoder pipeline

pub mod postprocess;
pub mod preprocessing;
pub mod sam;

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use postprocess::{mask_bounding_box, select_best_mask, MaskCandidate};
pub use sam::SamSegmentationModel;

/// Whether a prompt point marks the object or the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointLabel {
    Background,
    Foreground,
}

impl PointLabel {
    /// Label value the prompt decoder expects
    pub fn as_f32(self) -> f32 {
        match self {
            PointLabel::Background => 0.0,
            PointLabel::Foreground => 1.0,
        }
    }
}

/// A prompt point in original image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPrompt {
    pub x: f32,
    pub y: f32,
    pub label: PointLabel,
}

impl PointPrompt {
    pub fn foreground(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            label: PointLabel::Foreground,
        }
    }
}

/// Bounding box of a segmented object, in original image pixel space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Predicted mask quality (0.0-1.0)
    pub confidence: f32,
    /// Number of mask pixels
    pub mask_area: usize,
}

impl DetectionBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Check if this box has a positive area
    pub fn is_valid(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }
}

/// A model that segments the object under one or more prompt points
///
/// Implementations must be shareable across request handlers.
#[cfg_attr(test, mockall::automock)]
pub trait PointSegmenter: Send + Sync {
    /// Short model name for logs and health output
    fn name(&self) -> String;

    /// Segment `image` and return the boxes of the prompted object, best first.
    /// An empty vector means nothing was found under the prompt.
    fn segment(&self, image: &DynamicImage, prompts: &[PointPrompt]) -> Result<Vec<DetectionBox>>;
}
