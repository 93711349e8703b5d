use compositing::DriverError;
use segmentation::SegmentationError;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::ingest::IngestError;

/// Pipeline step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Segmentation,
    Compositing,
    Aggregation,
}

/// Failure taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
pub enum ErrorKind {
    IngestionFailed,
    SegmentationFailed,
    SegmentationOutputInvalid,
    SegmentationOutputMissing,
    CompositeFailed,
    AggregationFailed,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Ingestion failed: {diagnostic}")]
    IngestionFailed { diagnostic: String },

    #[error("Segmentation failed: {diagnostic}")]
    SegmentationFailed { diagnostic: String },

    #[error("Segmentation output invalid: {diagnostic}")]
    SegmentationOutputInvalid { diagnostic: String },

    #[error("Segmentation output missing: {diagnostic}")]
    SegmentationOutputMissing { diagnostic: String },

    #[error("Compositing panel {panel} failed: {diagnostic}")]
    CompositeFailed { panel: usize, diagnostic: String },

    #[error("Aggregation failed: {diagnostic}")]
    AggregationFailed { diagnostic: String },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IngestionFailed { .. } => ErrorKind::IngestionFailed,
            Self::SegmentationFailed { .. } => ErrorKind::SegmentationFailed,
            Self::SegmentationOutputInvalid { .. } => ErrorKind::SegmentationOutputInvalid,
            Self::SegmentationOutputMissing { .. } => ErrorKind::SegmentationOutputMissing,
            Self::CompositeFailed { .. } => ErrorKind::CompositeFailed,
            Self::AggregationFailed { .. } => ErrorKind::AggregationFailed,
        }
    }

    pub fn stage(&self) -> Stage {
        match self.kind() {
            ErrorKind::IngestionFailed => Stage::Ingestion,
            ErrorKind::SegmentationFailed
            | ErrorKind::SegmentationOutputInvalid
            | ErrorKind::SegmentationOutputMissing => Stage::Segmentation,
            ErrorKind::CompositeFailed => Stage::Compositing,
            ErrorKind::AggregationFailed => Stage::Aggregation,
        }
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            Self::IngestionFailed { diagnostic }
            | Self::SegmentationFailed { diagnostic }
            | Self::SegmentationOutputInvalid { diagnostic }
            | Self::SegmentationOutputMissing { diagnostic }
            | Self::CompositeFailed { diagnostic, .. }
            | Self::AggregationFailed { diagnostic } => diagnostic,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            stage: self.stage(),
            kind: self.kind(),
            panel: match self {
                Self::CompositeFailed { panel, .. } => Some(*panel),
                _ => None,
            },
            diagnostic: self.diagnostic().to_string(),
        }
    }

    pub(crate) fn aggregation(diagnostic: impl Into<String>) -> Self {
        Self::AggregationFailed {
            diagnostic: diagnostic.into(),
        }
    }
}

impl From<IngestError> for PipelineError {
    fn from(err: IngestError) -> Self {
        Self::IngestionFailed {
            diagnostic: err.to_string(),
        }
    }
}

impl From<SegmentationError> for PipelineError {
    fn from(err: SegmentationError) -> Self {
        let diagnostic = err.diagnostic();
        match err {
            SegmentationError::Failed(_) => Self::SegmentationFailed { diagnostic },
            SegmentationError::OutputInvalid(_) => Self::SegmentationOutputInvalid { diagnostic },
            SegmentationError::OutputMissing(_) | SegmentationError::PanelCountMismatch { .. } => {
                Self::SegmentationOutputMissing { diagnostic }
            }
        }
    }
}

/// Structured, serialisable form of a [`PipelineError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub stage: Stage,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<usize>,
    pub diagnostic: String,
}

/// Errors raised while assembling a [`crate::Pipeline`]
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Compositing driver unavailable: {0}")]
    Driver(#[from] DriverError),
    #[error("HTTP client initialisation failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
