#[cfg(feature = "magick")]
pub mod magick;

#[cfg(feature = "native")]
pub mod native;

use std::path::PathBuf;

use async_trait::async_trait;
use panel_kit_common::process::ToolError;
use panel_kit_common::{Dimensions, PanelOrigin};
use strum::{Display, IntoStaticStr};

use crate::{AggregateJob, BackgroundLayer, LayeredOutput, PositionJob, PositionedPanel};

#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("Failed to initialize driver: {0}")]
    Initialization(String),
    #[error("Execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("No layers to aggregate")]
    EmptyInput,
    #[error("Panel {index} ({width}x{height} at {}) does not fit the {dimensions} canvas", .origin.geometry())]
    OutOfBounds {
        index: usize,
        origin: PanelOrigin,
        width: u32,
        height: u32,
        dimensions: Dimensions,
    },
    #[cfg(feature = "native")]
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl DriverError {
    /// The tool's own output when a command failed, otherwise the error text
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Tool(err) => err.diagnostic(),
            other => other.to_string(),
        }
    }
}

/// One compositing tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CompositeOperation {
    /// Copy an image, normalising its format by the output extension
    Extract { input: PathBuf, output: PathBuf },
    /// Overlay `input` at `origin` on a transparent canvas of `dimensions`
    Position {
        dimensions: Dimensions,
        origin: PanelOrigin,
        input: PathBuf,
        output: PathBuf,
    },
    /// Stack `layers` bottom first under a flattened background
    Aggregate {
        layers: Vec<PathBuf>,
        background: BackgroundLayer,
        output: PathBuf,
    },
    /// Print the number of images stored in `input`, once per image
    Identify { input: PathBuf },
}

/// Places a single panel on a page-sized canvas.
///
/// Jobs are independent of each other, so callers may run several at once.
#[async_trait]
pub trait Compositor: Send + Sync {
    async fn position(&self, job: &PositionJob) -> Result<PositionedPanel, DriverError>;

    fn name(&self) -> &str;
}

/// Merges positioned panels into one layered file
#[async_trait]
pub trait LayerAggregator: Send + Sync {
    async fn aggregate(&self, job: &AggregateJob) -> Result<LayeredOutput, DriverError>;

    fn name(&self) -> &str;
}
