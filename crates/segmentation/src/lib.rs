//! # Segmentation
//!
//! Runs an external comic-panel segmentation tool against a page image and
//! turns its report plus the panel images it writes into an explicitly paired,
//! ordered list of [`DetectedPanel`]s.
//!
//! The only backend shipped is [`KumikoSegmenter`], which drives the Kumiko CLI.

pub mod artifacts;
pub mod kumiko;
pub mod output;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use panel_kit_common::process::ToolError;
use panel_kit_common::{Dimensions, PanelOrigin, PanelSize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use artifacts::{discover_artifacts, pair_panels};
pub use kumiko::{KumikoConfig, KumikoSegmenter, PanelDirectory};
pub use output::parse_output;

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Segmentation tool failed: {0}")]
    Failed(#[from] ToolError),
    #[error("Segmentation output invalid: {0}")]
    OutputInvalid(String),
    #[error("Segmentation output missing: {0}")]
    OutputMissing(String),
    #[error("Segmentation reported {expected} panels but produced {found} panel images")]
    PanelCountMismatch { expected: usize, found: usize },
}

impl SegmentationError {
    /// Text suitable for surfacing to a caller: the tool's own output when it failed
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed(err) => err.diagnostic(),
            other => other.to_string(),
        }
    }
}

/// Placement of one panel as reported by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelGeometry {
    pub origin: PanelOrigin,
    pub size: Option<PanelSize>,
}

/// The tool's structured report for one page, panels in detection order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    pub dimensions: Dimensions,
    pub panels: Vec<PanelGeometry>,
}

/// A panel image paired with its geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPanel {
    /// Position in detection order; also the layer order downstream
    pub index: usize,
    pub origin: PanelOrigin,
    pub size: Option<PanelSize>,
    pub artifact: PathBuf,
}

/// Result of segmenting one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    pub dimensions: Dimensions,
    pub panels: Vec<DetectedPanel>,
}

impl Segmentation {
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    pub fn geometry(&self) -> Vec<PanelOrigin> {
        self.panels.iter().map(|panel| panel.origin).collect()
    }
}

/// A backend able to split a page image into panels.
///
/// `run_dir` is scratch space owned by the current run; everything the
/// segmenter writes must end up below it.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, image: &Path, run_dir: &Path) -> Result<Segmentation, SegmentationError>;

    fn name(&self) -> &str;
}
