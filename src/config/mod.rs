// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every option can be given on the command line or through the environment
//! (a `.env` file is loaded first by `main`).

use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::vision::SegmentationModelConfig;

/// Default origin allowed to call `/api/*` (the Vite dev server)
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Maximum decoded image size (10MB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Fabstir object crop service
#[derive(Parser, Debug, Clone)]
#[command(name = "fabstir-object-crop")]
#[command(version)]
#[command(about = "Segment the object under a point and return it as JPEG crops", long_about = None)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    #[arg(long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "SERVER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Single origin allowed for cross-origin requests to /api/*
    #[arg(long, env = "CORS_ALLOWED_ORIGIN", default_value = DEFAULT_ALLOWED_ORIGIN)]
    pub allowed_origin: String,

    /// Directory holding the segmentation encoder/decoder ONNX files
    #[arg(long, env = "MODEL_DIR", default_value = "./models/sam2.1-tiny-onnx")]
    pub model_dir: PathBuf,

    /// Encoder file name inside the model directory
    #[arg(long, env = "ENCODER_FILE", default_value = "encoder.onnx")]
    pub encoder_file: String,

    /// Decoder file name inside the model directory
    #[arg(long, env = "DECODER_FILE", default_value = "decoder.onnx")]
    pub decoder_file: String,

    /// Root directory for per-request temporary files
    #[arg(long, env = "TEMP_DIR", default_value = "./temp")]
    pub temp_dir: PathBuf,

    /// Minimum predicted IoU for a mask to count as a detection
    #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = 0.5)]
    pub confidence_threshold: f32,

    /// Masks smaller than this many pixels are discarded
    #[arg(long, env = "MIN_MASK_AREA", default_value_t = 16)]
    pub min_mask_area: usize,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// JPEG quality for the temp copy and the returned crops (1-100)
    #[arg(long, env = "JPEG_QUALITY", default_value_t = 95)]
    pub jpeg_quality: u8,

    /// Maximum decoded image size in bytes
    #[arg(long, env = "MAX_IMAGE_BYTES", default_value_t = DEFAULT_MAX_IMAGE_BYTES)]
    pub max_image_bytes: usize,

    /// Run one dummy inference at start-up
    #[arg(long, env = "WARM_UP_MODEL", default_value_t = true, action = clap::ArgAction::Set)]
    pub warm_up: bool,

    /// Write crops into the request's model output directory before returning them
    #[arg(long, env = "SAVE_CROPS", default_value_t = true, action = clap::ArgAction::Set)]
    pub save_crops: bool,

    /// Include internal error text in 500 responses
    #[arg(long, env = "EXPOSE_ERROR_DETAILS", default_value_t = false, action = clap::ArgAction::Set)]
    pub expose_error_details: bool,
}

impl ServerConfig {
    /// Reject values that would only fail later at request time
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg_quality must be in 1..=100, got {}", self.jpeg_quality);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be in 0.0..=1.0, got {}",
                self.confidence_threshold
            );
        }
        if self.max_image_bytes == 0 {
            bail!("max_image_bytes must be non-zero");
        }
        if self.allowed_origin.trim().is_empty() {
            bail!("allowed_origin must not be empty");
        }
        Ok(())
    }

    /// Socket address the server listens on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse::<SocketAddr>()?)
    }

    /// Settings the crop handler needs at request time
    pub fn crop_settings(&self) -> CropSettings {
        CropSettings {
            temp_dir: self.temp_dir.clone(),
            jpeg_quality: self.jpeg_quality,
            max_image_bytes: self.max_image_bytes,
            save_crops: self.save_crops,
            expose_error_details: self.expose_error_details,
        }
    }

    /// Model loading configuration
    pub fn model_config(&self) -> SegmentationModelConfig {
        SegmentationModelConfig {
            model_dir: Some(self.model_dir.clone()),
            encoder_file: self.encoder_file.clone(),
            decoder_file: self.decoder_file.clone(),
            confidence_threshold: self.confidence_threshold,
            min_mask_area: self.min_mask_area,
            intra_threads: self.intra_threads,
            warm_up: self.warm_up,
        }
    }
}

/// Per-request settings shared with the crop handler
#[derive(Debug, Clone)]
pub struct CropSettings {
    /// Root of the per-request workspaces
    pub temp_dir: PathBuf,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Maximum decoded image size in bytes
    pub max_image_bytes: usize,
    /// Persist crops into the workspace output directory
    pub save_crops: bool,
    /// Include internal error text in 500 responses
    pub expose_error_details: bool,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./temp"),
            jpeg_quality: 95,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            save_crops: true,
            expose_error_details: false,
        }
    }
}

impl CropSettings {
    /// Largest request body accepted, allowing for base64 expansion and a data URI prefix
    pub fn max_body_bytes(&self) -> usize {
        (self.max_image_bytes / 3)
            .saturating_mul(4)
            .saturating_add(64 * 1024)
    }
}
