// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! SAM-style point-prompted segmentation model
//!
//! Two ONNX models run in sequence:
//! - Encoder: 1024x1024 image -> image embeddings + high resolution features
//! - Decoder: embeddings + point prompts -> candidate masks + predicted IoU
//!
//! Runs on CPU only.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::ArrayD;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

use super::postprocess::masks_to_detection;
use super::preprocessing::{build_prompt_tensors, preprocess_for_encoder};
use super::{DetectionBox, PointPrompt, PointSegmenter};

/// Encoder output holding the image embeddings
const IMAGE_EMBEDDINGS: &str = "image_embeddings";
/// Encoder outputs holding the high resolution features
const HIGH_RES_FEATURES_0: &str = "high_res_features_0";
const HIGH_RES_FEATURES_1: &str = "high_res_features_1";

/// Decoder outputs
const MASKS: &str = "masks";
const IOU_PREDICTIONS: &str = "iou_predictions";

/// Side of the dummy image used for warm-up
const WARM_UP_SIZE: u32 = 50;

/// Embeddings produced by the encoder for one image
struct ImageEmbeddings {
    image_embeddings: ArrayD<f32>,
    high_res_features_0: ArrayD<f32>,
    high_res_features_1: ArrayD<f32>,
}

/// Point-prompted segmentation model (SAM 2.1 ONNX export)
#[derive(Clone)]
pub struct SamSegmentationModel {
    /// Encoder session (thread-safe)
    encoder: Arc<Mutex<Session>>,
    /// Decoder session (thread-safe)
    decoder: Arc<Mutex<Session>>,
    /// Encoder image input name
    encoder_input: String,
    /// Minimum predicted IoU for a detection
    confidence_threshold: f32,
    /// Minimum mask area in image pixels
    min_mask_area: usize,
    /// Model name
    name: String,
}

impl std::fmt::Debug for SamSegmentationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamSegmentationModel")
            .field("name", &self.name)
            .field("encoder_input", &self.encoder_input)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("min_mask_area", &self.min_mask_area)
            .finish_non_exhaustive()
    }
}

impl SamSegmentationModel {
    /// Load the encoder and decoder models
    ///
    /// # Errors
    /// Returns error if:
    /// - Either model file is not found
    /// - ONNX Runtime initialization fails
    pub async fn new<P: AsRef<Path>>(
        encoder_path: P,
        decoder_path: P,
        intra_threads: usize,
    ) -> Result<Self> {
        let encoder_path = encoder_path.as_ref();
        let decoder_path = decoder_path.as_ref();

        for path in [encoder_path, decoder_path] {
            if !path.exists() {
                anyhow::bail!("Segmentation model not found: {}", path.display());
            }
        }

        info!(
            "Loading segmentation models: encoder={}, decoder={}",
            encoder_path.display(),
            decoder_path.display()
        );

        let encoder = build_session(encoder_path, intra_threads)?;
        let decoder = build_session(decoder_path, intra_threads)?;

        let encoder_input = encoder
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input".to_string());

        debug!(
            "Encoder input: {}, decoder inputs: {:?}",
            encoder_input,
            decoder.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
        );

        info!("✅ Segmentation model loaded successfully (CPU-only)");

        Ok(Self {
            encoder: Arc::new(Mutex::new(encoder)),
            decoder: Arc::new(Mutex::new(decoder)),
            encoder_input,
            confidence_threshold: 0.5,
            min_mask_area: 16,
            name: "sam2.1-tiny".to_string(),
        })
    }

    /// Set the confidence threshold for detections
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the minimum mask area in image pixels
    pub fn with_min_mask_area(mut self, area: usize) -> Self {
        self.min_mask_area = area;
        self
    }

    /// Get current confidence threshold
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Run one inference on a small black image so the first request
    /// does not pay for graph initialization
    pub fn warm_up(&self) -> Result<()> {
        let start = Instant::now();
        let dummy = DynamicImage::new_rgb8(WARM_UP_SIZE, WARM_UP_SIZE);
        let centre = (WARM_UP_SIZE / 2) as f32;
        self.segment(&dummy, &[PointPrompt::foreground(centre, centre)])
            .context("Warm-up inference failed")?;
        info!(
            "Model warm-up completed in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn run_encoder(&self, image: &DynamicImage) -> Result<ImageEmbeddings> {
        let input = Value::from_array(preprocess_for_encoder(image))
            .context("Failed to create encoder input tensor")?;

        let mut session = self
            .encoder
            .lock()
            .map_err(|_| anyhow!("Encoder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.encoder_input.as_str() => input])
            .context("Encoder inference failed")?;

        let extract = |name: &str| -> Result<ArrayD<f32>> {
            Ok(outputs[name]
                .try_extract_array::<f32>()
                .with_context(|| format!("Failed to extract encoder output {}", name))?
                .to_owned())
        };

        Ok(ImageEmbeddings {
            image_embeddings: extract(IMAGE_EMBEDDINGS)?,
            high_res_features_0: extract(HIGH_RES_FEATURES_0)?,
            high_res_features_1: extract(HIGH_RES_FEATURES_1)?,
        })
    }

    fn run_decoder(
        &self,
        embeddings: ImageEmbeddings,
        prompts: &[PointPrompt],
        width: u32,
        height: u32,
    ) -> Result<(ArrayD<f32>, Vec<f32>)> {
        let tensors = build_prompt_tensors(prompts, width, height);

        let image_embeddings = Value::from_array(embeddings.image_embeddings)?;
        let high_res_0 = Value::from_array(embeddings.high_res_features_0)?;
        let high_res_1 = Value::from_array(embeddings.high_res_features_1)?;
        let point_coords = Value::from_array(tensors.point_coords)?;
        let point_labels = Value::from_array(tensors.point_labels)?;
        let mask_input = Value::from_array(tensors.mask_input)?;
        let has_mask_input = Value::from_array(tensors.has_mask_input)?;
        let orig_im_size = Value::from_array(tensors.orig_im_size)?;

        let mut session = self
            .decoder
            .lock()
            .map_err(|_| anyhow!("Decoder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![
                IMAGE_EMBEDDINGS => image_embeddings,
                HIGH_RES_FEATURES_0 => high_res_0,
                HIGH_RES_FEATURES_1 => high_res_1,
                "point_coords" => point_coords,
                "point_labels" => point_labels,
                "mask_input" => mask_input,
                "has_mask_input" => has_mask_input,
                "orig_im_size" => orig_im_size,
            ])
            .context("Decoder inference failed")?;

        let masks = outputs[MASKS]
            .try_extract_array::<f32>()
            .context("Failed to extract mask output")?
            .to_owned();

        let iou_scores: Vec<f32> = outputs[IOU_PREDICTIONS]
            .try_extract_array::<f32>()
            .context("Failed to extract IoU output")?
            .iter()
            .copied()
            .collect();

        debug!("Decoder masks: {:?}, iou: {:?}", masks.shape(), iou_scores);

        Ok((masks, iou_scores))
    }
}

impl PointSegmenter for SamSegmentationModel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn segment(&self, image: &DynamicImage, prompts: &[PointPrompt]) -> Result<Vec<DetectionBox>> {
        if prompts.is_empty() {
            anyhow::bail!("At least one prompt point is required");
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot segment an empty image");
        }

        let start = Instant::now();
        let embeddings = self.run_encoder(image)?;
        let (masks, iou_scores) = self.run_decoder(embeddings, prompts, width, height)?;

        let detection = masks_to_detection(
            masks.view(),
            &iou_scores,
            width,
            height,
            self.confidence_threshold,
            self.min_mask_area,
        )?;

        debug!(
            "Segmentation of {}x{} image took {}ms, detection: {:?}",
            width,
            height,
            start.elapsed().as_millis(),
            detection
        );

        Ok(detection.into_iter().collect())
    }
}

/// Build a CPU-only ONNX Runtime session
fn build_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to set CPU execution provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads.max(1))
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load segmentation model from {}",
            model_path.display()
        ))
}
