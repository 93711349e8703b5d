use std::path::{Path, PathBuf};

use panel_kit_common::utils;

use crate::{DetectedPanel, PageLayout, Segmentation, SegmentationError};

/// List the panel images the tool wrote into `dir`.
///
/// Only regular files with a raster extension are kept. File names are sorted
/// lexicographically; that order is what pairs images with geometry entries,
/// so the tool must name its files such that it reproduces detection order.
pub fn discover_artifacts(dir: &Path) -> Result<Vec<PathBuf>, SegmentationError> {
    if !dir.is_dir() {
        return Err(SegmentationError::OutputMissing(format!(
            "panel directory does not exist: {}",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        SegmentationError::OutputMissing(format!("cannot list {}: {}", dir.display(), e))
    })?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            SegmentationError::OutputMissing(format!("cannot list {}: {}", dir.display(), e))
        })?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let is_image = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(utils::is_image_file)
            .unwrap_or(false);
        if is_file && is_image {
            artifacts.push(path);
        }
    }

    artifacts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(artifacts)
}

/// Pair each geometry entry with the artifact at the same position.
///
/// Counts must match exactly; a short or long artifact list is an error rather
/// than a truncated result.
pub fn pair_panels(layout: PageLayout, artifacts: Vec<PathBuf>) -> Result<Segmentation, SegmentationError> {
    if layout.panels.len() != artifacts.len() {
        return Err(SegmentationError::PanelCountMismatch {
            expected: layout.panels.len(),
            found: artifacts.len(),
        });
    }

    let panels = layout
        .panels
        .into_iter()
        .zip(artifacts)
        .enumerate()
        .map(|(index, (geometry, artifact))| DetectedPanel {
            index,
            origin: geometry.origin,
            size: geometry.size,
            artifact,
        })
        .collect();

    Ok(Segmentation {
        dimensions: layout.dimensions,
        panels,
    })
}
