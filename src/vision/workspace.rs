// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-request temporary files
//!
//! Every crop request gets its own directory under the temp root:
//!
//! ```text
//! <temp_root>/<request_id>/input.jpg
//! <temp_root>/<request_id>/runs/segment/crop_<i>_<j>.jpg
//! ```
//!
//! Cleanup is best-effort: failures are logged and counted, never returned.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::image_utils::encode_jpeg;

/// File name of the persisted input copy
pub const INPUT_FILE_NAME: &str = "input.jpg";

/// Model output directory, relative to the request directory
pub const OUTPUT_SUBDIR: &str = "runs/segment";

/// Counts from a cleanup pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
    /// Entries left alone because they are not ours
    pub skipped: usize,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Temporary directory owned by one request
///
/// Dropping an uncleaned workspace cleans it, so a panicking request
/// still releases its files.
#[derive(Debug)]
pub struct RequestWorkspace {
    id: Uuid,
    dir: PathBuf,
    output_dir: PathBuf,
    cleaned: bool,
}

impl RequestWorkspace {
    /// Create `<temp_root>/<id>/` and its model output directory
    pub fn create(temp_root: &Path, id: Uuid) -> Result<Self> {
        let dir = temp_root.join(id.to_string());
        let output_dir = dir.join(OUTPUT_SUBDIR);

        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create request workspace {}", output_dir.display())
        })?;

        debug!("Created workspace {}", dir.display());

        Ok(Self {
            id,
            dir,
            output_dir,
            cleaned: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE_NAME)
    }

    /// Persist a JPEG copy of the request image
    pub fn persist_input(&self, image: &DynamicImage, quality: u8) -> Result<PathBuf> {
        let path = self.input_path();
        let bytes = encode_jpeg(image, quality).context("Failed to encode input copy")?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write input copy {}", path.display()))?;
        debug!("Input image saved at {}", path.display());
        Ok(path)
    }

    /// Path of crop `box_index` of result `result_index`
    pub fn crop_path(&self, result_index: usize, box_index: usize) -> PathBuf {
        self.output_dir
            .join(format!("crop_{}_{}.jpg", result_index, box_index))
    }

    /// Write an encoded crop into the model output directory
    pub fn save_crop(&self, result_index: usize, box_index: usize, jpeg: &[u8]) -> Result<PathBuf> {
        let path = self.crop_path(result_index, box_index);
        fs::write(&path, jpeg)
            .with_context(|| format!("Failed to write crop {}", path.display()))?;
        Ok(path)
    }

    /// Remove every file of this request, then the request directory itself
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        self.cleaned = true;

        if !self.dir.exists() {
            return report;
        }

        // Files directly in the request directory (the input copy)
        match fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        remove_file_logged(&path, &mut report);
                    }
                }
            }
            Err(e) => {
                warn!("Error listing workspace {}: {}", self.dir.display(), e);
                report.failures += 1;
            }
        }

        // The model output tree
        let runs_dir = self.dir.join("runs");
        if runs_dir.exists() {
            remove_dir_logged(&runs_dir, &mut report);
        }

        match fs::remove_dir(&self.dir) {
            Ok(()) => report.dirs_removed += 1,
            Err(e) => {
                warn!("Error removing workspace {}: {}", self.dir.display(), e);
                report.failures += 1;
            }
        }

        debug!(
            "Workspace {} cleaned: {} files, {} dirs, {} failures",
            self.id, report.files_removed, report.dirs_removed, report.failures
        );

        report
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            self.cleanup();
        }
    }
}

/// Remove request workspaces left under `temp_root`, creating it if missing
///
/// Only directories named by a request id are removed. Anything else under
/// the root is logged and left in place.
pub fn sweep_stale(temp_root: &Path) -> Result<CleanupReport> {
    fs::create_dir_all(temp_root)
        .with_context(|| format!("Failed to create temp directory {}", temp_root.display()))?;

    let mut report = CleanupReport::default();
    let entries = fs::read_dir(temp_root)
        .with_context(|| format!("Failed to list temp directory {}", temp_root.display()))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_workspace = entry
            .file_name()
            .to_str()
            .map(|name| Uuid::parse_str(name).is_ok())
            .unwrap_or(false);
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        if is_workspace && is_dir {
            remove_dir_logged(&path, &mut report);
        } else {
            debug!("Sweep skipped {}", path.display());
            report.skipped += 1;
        }
    }

    if report.skipped > 0 {
        warn!(
            "Temp directory {} holds {} entries that are not request workspaces",
            temp_root.display(),
            report.skipped
        );
    }

    Ok(report)
}

fn remove_file_logged(path: &Path, report: &mut CleanupReport) {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed file: {}", path.display());
            report.files_removed += 1;
        }
        Err(e) => {
            warn!("Error removing file {}: {}", path.display(), e);
            report.failures += 1;
        }
    }
}

fn remove_dir_logged(path: &Path, report: &mut CleanupReport) {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed directory: {}", path.display());
            report.dirs_removed += 1;
        }
        Err(e) => {
            warn!("Error removing directory {}: {}", path.display(), e);
            report.failures += 1;
        }
    }
}
