// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoder output post-processing
//!
//! The prompt decoder returns several candidate masks as logits, shape
//! [1, N, H, W], together with a predicted IoU per candidate, shape [1, N].

use anyhow::{bail, Result};
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix4};

use super::DetectionBox;

/// Mask logits above this value belong to the object
pub const MASK_LOGIT_THRESHOLD: f32 = 0.0;

/// The candidate mask chosen from the decoder output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskCandidate {
    pub index: usize,
    pub iou: f32,
}

/// Pick the candidate with the highest predicted IoU
///
/// NaN scores are never selected.
pub fn select_best_mask(iou_scores: &[f32]) -> Option<MaskCandidate> {
    iou_scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, iou)| !iou.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, iou)| MaskCandidate { index, iou })
}

/// Tight bounding box of all pixels above `threshold`
///
/// Returns `(min_x, min_y, max_x, max_y, area)` in mask pixel indices
/// (inclusive), or `None` for an empty mask.
pub fn mask_bounding_box(
    mask: ArrayView2<f32>,
    threshold: f32,
) -> Option<(usize, usize, usize, usize, usize)> {
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut area = 0;

    for ((y, x), &value) in mask.indexed_iter() {
        if value > threshold {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            area += 1;
        }
    }

    if area == 0 {
        None
    } else {
        Some((min_x, min_y, max_x, max_y, area))
    }
}

/// Turn decoder outputs into at most one detection box in image space
///
/// # Arguments
/// - `masks`: decoder mask logits [1, N, H, W]
/// - `iou_scores`: predicted IoU per candidate (N values)
/// - `image_width`, `image_height`: original image size
/// - `confidence_threshold`: minimum IoU of the chosen candidate
/// - `min_mask_area`: minimum number of mask pixels
pub fn masks_to_detection(
    masks: ArrayViewD<f32>,
    iou_scores: &[f32],
    image_width: u32,
    image_height: u32,
    confidence_threshold: f32,
    min_mask_area: usize,
) -> Result<Option<DetectionBox>> {
    let masks = match masks.into_dimensionality::<Ix4>() {
        Ok(m) => m,
        Err(_) => bail!("Unexpected mask output rank, expected [1, N, H, W]"),
    };

    let (batch, candidates, mask_h, mask_w) = masks.dim();
    if batch == 0 || candidates == 0 || mask_h == 0 || mask_w == 0 {
        bail!("Empty mask output: {:?}", masks.shape());
    }
    if iou_scores.len() < candidates {
        bail!(
            "IoU output has {} scores for {} masks",
            iou_scores.len(),
            candidates
        );
    }

    let best = match select_best_mask(&iou_scores[..candidates]) {
        Some(best) => best,
        None => return Ok(None),
    };

    if best.iou < confidence_threshold {
        tracing::debug!(
            "Best mask #{} below confidence threshold: {:.3} < {:.3}",
            best.index,
            best.iou,
            confidence_threshold
        );
        return Ok(None);
    }

    let mask = masks.index_axis(Axis(0), 0).index_axis_move(Axis(0), best.index);

    let (min_x, min_y, max_x, max_y, area) = match mask_bounding_box(mask, MASK_LOGIT_THRESHOLD) {
        Some(b) => b,
        None => return Ok(None),
    };

    // Masks may come back at a lower resolution than the image
    let scale_x = image_width as f32 / mask_w as f32;
    let scale_y = image_height as f32 / mask_h as f32;
    let scaled_area = (area as f32 * scale_x * scale_y).round() as usize;

    if scaled_area < min_mask_area {
        tracing::debug!("Mask too small: {} px < {} px", scaled_area, min_mask_area);
        return Ok(None);
    }

    Ok(Some(DetectionBox {
        x1: min_x as f32 * scale_x,
        y1: min_y as f32 * scale_y,
        x2: (max_x + 1) as f32 * scale_x,
        y2: (max_y + 1) as f32 * scale_y,
        confidence: best.iou.clamp(0.0, 1.0),
        mask_area: scaled_area,
    }))
}
