// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tensor preparation for the segmentation encoder and prompt decoder

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array1, Array2, Array3, Array4};

use super::PointPrompt;
use crate::vision::image_utils::image_to_array;

/// Square input resolution of the image encoder
pub const ENCODER_INPUT_SIZE: u32 = 1024;

/// Side of the low-resolution mask prompt fed back into the decoder
pub const MASK_INPUT_SIZE: usize = 256;

/// Preprocess an image for the encoder
///
/// Steps:
/// 1. Resize (exact) to ENCODER_INPUT_SIZE x ENCODER_INPUT_SIZE
/// 2. Convert to RGB
/// 3. Scale to [0, 1]; the exported encoder normalizes internally
/// 4. Convert to NCHW tensor format [1, 3, 1024, 1024]
pub fn preprocess_for_encoder(image: &DynamicImage) -> Array4<f32> {
    let size = ENCODER_INPUT_SIZE as usize;
    let resized = image.resize_exact(ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE, FilterType::Triangle);
    let pixels = image_to_array(&resized);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for ((y, x, c), &value) in pixels.indexed_iter() {
        tensor[[0, c, y, x]] = value as f32 / 255.0;
    }

    tensor
}

/// Map a point from original image space into encoder input space
///
/// The encoder input is a non-uniform resize, so each axis scales on its own.
pub fn map_point_to_model_space(x: f32, y: f32, width: u32, height: u32) -> (f32, f32) {
    let scale_x = ENCODER_INPUT_SIZE as f32 / width.max(1) as f32;
    let scale_y = ENCODER_INPUT_SIZE as f32 / height.max(1) as f32;
    (x * scale_x, y * scale_y)
}

/// Decoder prompt tensors
#[derive(Debug, Clone)]
pub struct PromptTensors {
    /// [1, N, 2] point coordinates in encoder input space
    pub point_coords: Array3<f32>,
    /// [1, N] point labels (1 = foreground, 0 = background)
    pub point_labels: Array2<f32>,
    /// [1, 1, 256, 256] previous mask logits (zeros on the first pass)
    pub mask_input: Array4<f32>,
    /// [1] whether `mask_input` carries a previous mask
    pub has_mask_input: Array1<f32>,
    /// [2] original image size as (height, width)
    pub orig_im_size: Array1<i64>,
}

/// Build decoder prompt tensors for `prompts` on an image of the given size
pub fn build_prompt_tensors(prompts: &[PointPrompt], width: u32, height: u32) -> PromptTensors {
    let count = prompts.len();

    let mut point_coords = Array3::<f32>::zeros((1, count, 2));
    let mut point_labels = Array2::<f32>::zeros((1, count));

    for (i, prompt) in prompts.iter().enumerate() {
        let (mx, my) = map_point_to_model_space(prompt.x, prompt.y, width, height);
        point_coords[[0, i, 0]] = mx;
        point_coords[[0, i, 1]] = my;
        point_labels[[0, i]] = prompt.label.as_f32();
    }

    PromptTensors {
        point_coords,
        point_labels,
        mask_input: Array4::<f32>::zeros((1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE)),
        has_mask_input: Array1::from_vec(vec![0.0]),
        orig_im_size: Array1::from_vec(vec![height as i64, width as i64]),
    }
}
