// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crop response types

use serde::{Deserialize, Serialize};

use crate::vision::to_jpeg_data_uri;

/// One cropped object, as a JPEG data URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropImage {
    /// `data:image/jpeg;base64,...`
    pub image: String,
}

impl CropImage {
    pub fn from_jpeg(jpeg_bytes: &[u8]) -> Self {
        Self {
            image: to_jpeg_data_uri(jpeg_bytes),
        }
    }
}

/// Body of a successful crop: a JSON array of crops, best first
pub type CropResponse = Vec<CropImage>;
