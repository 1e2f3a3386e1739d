// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crop request types and validation

use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;

/// Request for cropping the object under a point
///
/// Fields are optional here so that a missing field is reported as a
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CropRequest {
    /// X coordinate in image pixels
    #[serde(default)]
    pub x: Option<f64>,

    /// Y coordinate in image pixels
    #[serde(default)]
    pub y: Option<f64>,

    /// Base64-encoded image, optionally a `data:image/...;base64,` URI
    #[serde(default)]
    pub image: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCrop {
    pub x: f32,
    pub y: f32,
    pub image: String,
}

impl CropRequest {
    /// Validate the crop request
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut missing = Vec::new();
        if self.x.is_none() {
            missing.push("x");
        }
        if self.y.is_none() {
            missing.push("y");
        }
        if self.image.as_deref().map(str::trim).unwrap_or("").is_empty() {
            missing.push("image");
        }
        if !missing.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "Missing required data: {}",
                missing.join(", ")
            )));
        }

        for (field, value) in [("x", self.x), ("y", self.y)] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ApiError::ValidationError {
                        field: field.to_string(),
                        message: "must be a finite number".to_string(),
                    });
                }
                if v < 0.0 {
                    return Err(ApiError::ValidationError {
                        field: field.to_string(),
                        message: format!("must not be negative, got {}", v),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate and take ownership of the fields
    pub fn into_validated(self) -> Result<ValidatedCrop, ApiError> {
        self.validate()?;
        match (self.x, self.y, self.image) {
            (Some(x), Some(y), Some(image)) => Ok(ValidatedCrop {
                x: x as f32,
                y: y as f32,
                image,
            }),
            _ => Err(ApiError::InvalidRequest("Missing required data".to_string())),
        }
    }
}
