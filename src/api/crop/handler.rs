// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crop endpoint handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::fs;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::request::{CropRequest, ValidatedCrop};
use super::response::{CropImage, CropResponse};
use crate::api::errors::{ApiError, ApiErrorResponse};
use crate::api::http_server::AppState;
use crate::config::CropSettings;
use crate::vision::{
    crop_to_box, decode_base64_image, encode_jpeg, ImageError, PointPrompt, PointSegmenter,
    RequestWorkspace,
};

/// Index of the single segmentation result produced per request
const RESULT_INDEX: usize = 0;

/// POST /api/crop - Crop the object under a point
///
/// # Request
/// - `x`, `y`: Point in image pixel coordinates (required)
/// - `image`: Base64 image, bare or as a data URI (required)
///
/// # Response
/// A JSON array of `{"image": "data:image/jpeg;base64,..."}`, one per detected box.
///
/// # Errors
/// - 400 Bad Request: Missing fields, malformed JSON, point outside the image
/// - 404 Not Found: Nothing was segmented under the point
/// - 503 Service Unavailable: Segmentation model not loaded
/// - 500 Internal Server Error: Decoding, inference or file handling failed
pub async fn crop_handler(
    State(state): State<AppState>,
    payload: Result<Json<CropRequest>, JsonRejection>,
) -> Result<Json<CropResponse>, ApiErrorResponse> {
    let request_id = Uuid::new_v4();
    let span = info_span!("crop_request", request_id = %request_id);

    handle_crop(state, payload, request_id)
        .instrument(span)
        .await
        .map(Json)
        .map_err(|e| ApiErrorResponse::with_request_id(e, request_id))
}

async fn handle_crop(
    state: AppState,
    payload: Result<Json<CropRequest>, JsonRejection>,
    request_id: Uuid,
) -> Result<CropResponse, ApiError> {
    // 1. Parse and validate the body
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected crop request body: {}", rejection.body_text());
        ApiError::InvalidRequest("Invalid request body".to_string())
    })?;

    let crop = request.into_validated().map_err(|e| {
        warn!("Crop validation failed: {}", e);
        e
    })?;

    debug!("Crop request at ({}, {})", crop.x, crop.y);

    // 2. Get the segmenter
    let segmenter = state
        .get_model_manager()
        .await
        .and_then(|manager| manager.get_segmenter())
        .ok_or_else(|| {
            warn!("Segmentation model not loaded");
            ApiError::ServiceUnavailable("Segmentation model not loaded".to_string())
        })?;

    let settings = state.settings.clone();

    // 3. Reserve this request's temp directory
    let mut workspace = RequestWorkspace::create(&settings.temp_dir, request_id).map_err(|e| {
        error!("Failed to create workspace: {:#}", e);
        ApiError::internal(format!("{:#}", e), settings.expose_error_details)
    })?;

    // 4. Run the pipeline off the async runtime; the workspace is cleaned
    // on every exit path, by `cleanup` or by its Drop on panic
    let span = Span::current();
    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let outcome = run_crop_pipeline(segmenter.as_ref(), &workspace, &crop, &settings);

        let report = workspace.cleanup();
        if !report.is_clean() {
            warn!("Workspace cleanup left {} entries behind", report.failures);
        }

        outcome
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(e) => {
            error!("Crop task failed: {}", e);
            Err(ApiError::internal(
                e.to_string(),
                state.settings.expose_error_details,
            ))
        }
    }
}

/// Decode, segment and crop one request inside its workspace
///
/// Returns the crops best first, or `NotFound` when no box survives.
pub fn run_crop_pipeline(
    segmenter: &dyn PointSegmenter,
    workspace: &RequestWorkspace,
    crop: &ValidatedCrop,
    settings: &CropSettings,
) -> Result<CropResponse, ApiError> {
    let started = Instant::now();
    let expose = settings.expose_error_details;

    let (image, info) =
        decode_base64_image(&crop.image, settings.max_image_bytes).map_err(|e| match e {
            ImageError::TooLarge(..) => {
                warn!("Rejected image: {}", e);
                ApiError::ValidationError {
                    field: "image".to_string(),
                    message: e.to_string(),
                }
            }
            other => {
                error!("Failed to decode image: {}", other);
                ApiError::internal(&other, expose)
            }
        })?;

    debug!(
        "Decoded image: {}x{}, {} bytes",
        info.width, info.height, info.size_bytes
    );

    if crop.x >= info.width as f32 || crop.y >= info.height as f32 {
        warn!(
            "Point ({}, {}) outside {}x{} image",
            crop.x, crop.y, info.width, info.height
        );
        return Err(ApiError::ValidationError {
            field: "point".to_string(),
            message: format!(
                "({}, {}) is outside the {}x{} image",
                crop.x, crop.y, info.width, info.height
            ),
        });
    }

    workspace
        .persist_input(&image, settings.jpeg_quality)
        .map_err(|e| {
            error!("Failed to save input image: {:#}", e);
            ApiError::internal(format!("{:#}", e), expose)
        })?;

    let boxes = segmenter
        .segment(&image, &[PointPrompt::foreground(crop.x, crop.y)])
        .map_err(|e| {
            error!("Segmentation failed: {:#}", e);
            ApiError::internal(format!("{:#}", e), expose)
        })?;

    debug!("Segmentation returned {} boxes", boxes.len());

    let mut crops = Vec::with_capacity(boxes.len());
    for (box_index, bbox) in boxes.iter().enumerate() {
        if !bbox.is_valid() {
            warn!("Skipping degenerate box {}: {:?}", box_index, bbox);
            continue;
        }

        let Some(region) = crop_to_box(&image, bbox) else {
            warn!("Skipping box {} outside the image: {:?}", box_index, bbox);
            continue;
        };

        let jpeg = match encode_jpeg(&region, settings.jpeg_quality) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode crop {}: {}", box_index, e);
                continue;
            }
        };

        let jpeg = if settings.save_crops {
            match save_and_reload(workspace, box_index, &jpeg) {
                Some(bytes) => bytes,
                None => continue,
            }
        } else {
            jpeg
        };

        crops.push(CropImage::from_jpeg(&jpeg));
    }

    if crops.is_empty() {
        info!("No crops generated");
        return Err(ApiError::NotFound("No crops were generated".to_string()));
    }

    info!(
        "Crop complete: {} crops in {}ms",
        crops.len(),
        started.elapsed().as_millis()
    );

    Ok(crops)
}

/// Write a crop into the workspace and read it back; `None` skips the crop
fn save_and_reload(workspace: &RequestWorkspace, box_index: usize, jpeg: &[u8]) -> Option<Vec<u8>> {
    let path = match workspace.save_crop(RESULT_INDEX, box_index, jpeg) {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to save crop {}: {:#}", box_index, e);
            return None;
        }
    };

    match fs::read(&path) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => {
            warn!("Crop file {} is empty", path.display());
            None
        }
        Err(e) => {
            error!("Error reading crop {}: {}", path.display(), e);
            None
        }
    }
}
