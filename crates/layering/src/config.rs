use std::path::PathBuf;
use std::time::Duration;

use compositing::{BackgroundLayer, OutputFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Orchestrator settings shared by every run of a [`crate::Pipeline`]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Panels composited in parallel
    pub concurrency: usize,
    /// How the flattened preview layer is built
    pub background: BackgroundLayer,
    /// Layered container format
    pub output_format: OutputFormat,
    /// Parent directory for per-run workspaces. Defaults to the system temp dir.
    pub work_root: Option<PathBuf>,
    /// Deadline for downloading URL sources
    pub fetch_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            background: BackgroundLayer::default(),
            output_format: OutputFormat::default(),
            work_root: None,
            fetch_timeout_secs: 60,
        }
    }
}

impl PipelineSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Effective parallelism; zero is treated as sequential
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: PipelineSettings =
            serde_json::from_str(r#"{"background": "flatten_first_two", "concurrency": 0}"#).unwrap();

        assert_eq!(settings.background, BackgroundLayer::FlattenFirstTwo);
        assert_eq!(settings.output_format, OutputFormat::Psd);
        assert_eq!(settings.concurrency(), 1);
        assert_eq!(settings.fetch_timeout(), Duration::from_secs(60));
    }
}
