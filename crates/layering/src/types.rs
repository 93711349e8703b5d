use std::path::PathBuf;

use chrono::{DateTime, Utc};
use compositing::OutputFormat;
use panel_kit_common::{Dimensions, PanelOrigin, PanelSize};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::error::Stage;

/// Where a run currently is. Runs only move forward, or into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case", tag = "state")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Ingested,
    Segmented,
    Composited,
    Aggregated,
    Delivered,
    Failed { stage: Stage },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed { .. })
    }

    /// The only non-failure state reachable from this one
    pub fn successor(&self) -> Option<RunState> {
        match self {
            Self::Ingested => Some(Self::Segmented),
            Self::Segmented => Some(Self::Composited),
            Self::Composited => Some(Self::Aggregated),
            Self::Aggregated => Some(Self::Delivered),
            Self::Delivered | Self::Failed { .. } => None,
        }
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        match next {
            Self::Failed { .. } => !self.is_terminal(),
            next => self.successor() == Some(next),
        }
    }
}

/// One panel as reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelPlacement {
    pub index: usize,
    pub origin: PanelOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<PanelSize>,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub run_id: Uuid,
    /// The layered file, at its final location
    pub artifact: PathBuf,
    pub format: OutputFormat,
    pub dimensions: Dimensions,
    pub panel_count: usize,
    /// Panel layers plus the flattened background
    pub layer_count: usize,
    pub geometry: Vec<PanelPlacement>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Delivery {
    pub fn origins(&self) -> Vec<PanelOrigin> {
        self.geometry.iter().map(|p| p.origin).collect()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
