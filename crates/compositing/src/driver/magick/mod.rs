use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use panel_kit_common::process::run_tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::driver::{CompositeOperation, Compositor, DriverError, LayerAggregator};
use crate::sources::{FileSink, ImageSource, Sink, Source};
use crate::{AggregateJob, LayeredOutput, PositionJob, PositionedPanel};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct MagickConfig {
    /// Explicit executable; looked up on the system when unset
    pub path: Option<PathBuf>,
    /// Deadline for each ImageMagick invocation
    pub timeout_secs: u64,
}

impl Default for MagickConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: 60,
        }
    }
}

/// ImageMagick driver implementation
#[derive(Debug, Clone)]
pub struct MagickDriver {
    magick_path: PathBuf,
    timeout: Duration,
}

impl MagickDriver {
    pub fn new() -> Result<Self, DriverError> {
        let magick_path = Self::find_magick_executable()?;

        Ok(Self {
            magick_path,
            timeout: Duration::from_secs(MagickConfig::default().timeout_secs),
        })
    }

    pub fn with_path(magick_path: impl Into<PathBuf>) -> Result<Self, DriverError> {
        let path = magick_path.into();

        // Verify the provided path is valid
        if !path.exists() {
            return Err(DriverError::Initialization(format!(
                "ImageMagick executable not found at: {}",
                path.display()
            )));
        }

        Ok(Self {
            magick_path: path,
            timeout: Duration::from_secs(MagickConfig::default().timeout_secs),
        })
    }

    pub fn from_config(config: &MagickConfig) -> Result<Self, DriverError> {
        let driver = match &config.path {
            Some(path) => Self::with_path(path)?,
            None => Self::new()?,
        };
        Ok(driver.with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn find_magick_executable() -> Result<PathBuf, DriverError> {
        // Try to find magick in PATH
        if let Ok(output) = std::process::Command::new("which").arg("magick").output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }

        // Try common locations
        let common_paths = [
            "/usr/bin/magick",
            "/usr/local/bin/magick",
            "/opt/homebrew/bin/magick",
            "magick", // Fallback to PATH
        ];

        for path in &common_paths {
            if Path::new(path).exists() || *path == "magick" {
                return Ok(PathBuf::from(path));
            }
        }

        Err(DriverError::Initialization(
            "ImageMagick executable not found. Please install ImageMagick 7 or specify the path.".to_string(),
        ))
    }

    pub fn build_command(&self, operation: &CompositeOperation) -> Result<Command, DriverError> {
        match operation {
            CompositeOperation::Extract { input, output } => Ok(self.build_extract_command(input, output)),
            CompositeOperation::Position {
                dimensions,
                origin,
                input,
                output,
            } => {
                let mut cmd = Command::new(&self.magick_path);
                cmd.arg("-size")
                    .arg(dimensions.to_string())
                    .arg("canvas:none")
                    .args(["-compose", "over"])
                    .arg(input)
                    .arg("-geometry")
                    .arg(origin.geometry())
                    .arg("-composite")
                    .arg(output);
                Ok(cmd)
            }
            CompositeOperation::Aggregate {
                layers,
                background,
                output,
            } => {
                if layers.is_empty() {
                    return Err(DriverError::EmptyInput);
                }
                let mut cmd = Command::new(&self.magick_path);
                for (i, layer) in layers.iter().enumerate() {
                    cmd.arg("-label").arg(format!("panel_{}", i)).arg(layer);
                }
                cmd.arg("(")
                    .arg("-clone")
                    .arg(background.clone_selector(layers.len()))
                    .arg("-flatten")
                    .args(["-set", "label", "background"])
                    .arg(")")
                    .args(["-insert", "0"])
                    .arg(output);
                Ok(cmd)
            }
            CompositeOperation::Identify { input } => {
                let mut cmd = Command::new(&self.magick_path);
                cmd.arg("identify").args(["-format", "%n\\n"]).arg(input);
                Ok(cmd)
            }
        }
    }

    fn build_extract_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.magick_path);
        cmd.arg(input).arg(output);
        cmd
    }

    async fn execute(&self, operation: &CompositeOperation) -> Result<String, DriverError> {
        let mut cmd = self.build_command(operation)?;
        debug!("Running magick {}", operation);

        // Clear DYLD_LIBRARY_PATH to avoid conflicts with bundled framework libraries
        cmd.env_remove("DYLD_LIBRARY_PATH");

        let output = run_tool("magick", cmd, self.timeout).await?;
        Ok(output.stdout)
    }

    /// Count the images actually stored in a written file
    async fn count_layers(&self, path: &Path) -> Result<usize, DriverError> {
        let stdout = self
            .execute(&CompositeOperation::Identify {
                input: path.to_path_buf(),
            })
            .await?;
        stdout
            .lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| DriverError::Execution(format!("Cannot read layer count of {}: {:?}", path.display(), stdout)))
    }
}

#[async_trait]
impl Compositor for MagickDriver {
    async fn position(&self, job: &PositionJob) -> Result<PositionedPanel, DriverError> {
        // The position command would silently clip an overflowing panel
        if let Some(size) = job.size {
            job.check_fits(size)?;
        }
        let source = ImageSource::new(&job.artifact);
        source.validate()?;
        let sink = FileSink::new(job.output_path());
        sink.validate()?;

        let extracted = job.extract_path();
        self.execute(&CompositeOperation::Extract {
            input: source.path.clone(),
            output: extracted.clone(),
        })
        .await?;

        self.execute(&CompositeOperation::Position {
            dimensions: job.dimensions,
            origin: job.origin,
            input: extracted,
            output: sink.path.clone(),
        })
        .await?;

        debug!("Positioned panel {} at {}", job.index, job.origin.geometry());
        Ok(PositionedPanel {
            index: job.index,
            origin: job.origin,
            path: sink.path,
        })
    }

    fn name(&self) -> &str {
        "magick"
    }
}

#[async_trait]
impl LayerAggregator for MagickDriver {
    async fn aggregate(&self, job: &AggregateJob) -> Result<LayeredOutput, DriverError> {
        if job.layers.is_empty() {
            return Err(DriverError::EmptyInput);
        }
        let sink = FileSink::new(&job.output);
        sink.validate()?;

        let layers = job.layers.iter().map(|layer| layer.path.clone()).collect::<Vec<_>>();
        self.execute(&CompositeOperation::Aggregate {
            layers,
            background: job.background,
            output: sink.path.clone(),
        })
        .await?;

        let layer_count = self.count_layers(&sink.path).await?;
        info!("Wrote {} layers to {}", layer_count, sink.description());
        Ok(LayeredOutput {
            path: sink.path,
            layer_count,
        })
    }

    fn name(&self) -> &str {
        "magick"
    }
}
