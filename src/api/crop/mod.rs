// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crop API endpoint module
//!
//! Provides POST /api/crop for cutting out the object under a point.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{crop_handler, run_crop_pipeline};
pub use request::{CropRequest, ValidatedCrop};
pub use response::{CropImage, CropResponse};
