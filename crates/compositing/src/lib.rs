pub mod driver;
pub mod sources;

use std::path::PathBuf;

use panel_kit_common::{Dimensions, PanelOrigin, PanelSize};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

pub use driver::{CompositeOperation, Compositor, DriverError, LayerAggregator};

#[cfg(feature = "magick")]
pub use driver::magick::{MagickConfig, MagickDriver};

#[cfg(feature = "native")]
pub use driver::native::NativeCompositor;

/// How the flattened preview layer under the panel layers is built
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackgroundLayer {
    /// Merge every panel layer
    #[default]
    FlattenAll,
    /// Merge only the first two panel layers
    FlattenFirstTwo,
}

impl BackgroundLayer {
    /// ImageMagick `-clone` selector for a stack of `layers` images
    pub fn clone_selector(&self, layers: usize) -> String {
        match self {
            Self::FlattenAll => "0--1".to_string(),
            Self::FlattenFirstTwo if layers >= 2 => "0,1".to_string(),
            Self::FlattenFirstTwo => "0".to_string(),
        }
    }
}

/// Layered container written by the aggregator
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Psd,
    Tiff,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Psd => "psd",
            Self::Tiff => "tiff",
        }
    }
}

/// Request to place one panel image on a page-sized transparent canvas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionJob {
    pub index: usize,
    pub dimensions: Dimensions,
    pub origin: PanelOrigin,
    /// Panel extent reported by the segmenter, when known
    pub size: Option<PanelSize>,
    pub artifact: PathBuf,
    /// Directory for this job's intermediate and output files
    pub work_dir: PathBuf,
}

impl PositionJob {
    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(format!("positioned_{:04}.png", self.index))
    }

    pub fn extract_path(&self) -> PathBuf {
        self.work_dir.join(format!("panel_{:04}.png", self.index))
    }

    /// Reject a panel of `size` that would be clipped by the canvas edge
    pub fn check_fits(&self, size: PanelSize) -> Result<(), DriverError> {
        if self.dimensions.contains(self.origin, size) {
            return Ok(());
        }
        Err(DriverError::OutOfBounds {
            index: self.index,
            origin: self.origin,
            width: size.width,
            height: size.height,
            dimensions: self.dimensions,
        })
    }
}

/// A page-sized canvas holding exactly one panel at its original offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedPanel {
    pub index: usize,
    pub origin: PanelOrigin,
    pub path: PathBuf,
}

/// Request to stack positioned panels into one layered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateJob {
    /// Panel layers, bottom first
    pub layers: Vec<PositionedPanel>,
    pub background: BackgroundLayer,
    pub output: PathBuf,
}

/// The layered file produced by an aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredOutput {
    pub path: PathBuf,
    /// Panel layers plus the flattened background
    pub layer_count: usize,
}
