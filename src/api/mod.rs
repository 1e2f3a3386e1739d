// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod crop;
pub mod errors;
pub mod http_server;

pub use crop::{crop_handler, CropImage, CropRequest, CropResponse};
pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use http_server::{create_app, health_handler, start_server, AppState, HealthResponse};
