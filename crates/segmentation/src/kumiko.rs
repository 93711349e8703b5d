use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use panel_kit_common::process::run_tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{Segmentation, SegmentationError, Segmenter, discover_artifacts, pair_panels, parse_output};

/// Serialises runs that share one tool-owned panel directory.
static SHARED_PANEL_DIR: Mutex<()> = Mutex::const_new(());

/// Where the tool leaves the panel images it saves
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelDirectory {
    /// Below the run directory, which is also the tool's working directory
    Run { subdir: PathBuf },
    /// A fixed directory owned by the tool installation and shared by all runs
    Shared { path: PathBuf },
}

impl Default for PanelDirectory {
    fn default() -> Self {
        Self::Run {
            subdir: PathBuf::from("out/panels"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct KumikoConfig {
    /// Interpreter or executable to launch
    pub program: String,
    /// Kumiko entry point, passed as the first argument when set
    pub script: Option<PathBuf>,
    /// Arguments; `{input}` is replaced by the image path and `{output}` by the run directory
    pub args: Vec<String>,
    pub panel_dir: PanelDirectory,
    pub timeout_secs: u64,
}

impl Default for KumikoConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some(PathBuf::from("kumiko")),
            args: vec!["-i".to_string(), "{input}".to_string(), "--save-panels".to_string()],
            panel_dir: PanelDirectory::default(),
            timeout_secs: 120,
        }
    }
}

pub struct KumikoSegmenter {
    config: KumikoConfig,
}

impl KumikoSegmenter {
    /// A relative `script` is resolved against the current directory here,
    /// since the tool itself runs inside each run directory.
    pub fn new(mut config: KumikoConfig) -> Self {
        if let Some(script) = config.script.take() {
            config.script = Some(std::path::absolute(&script).unwrap_or(script));
        }
        Self { config }
    }

    fn build_command(&self, image: &Path, run_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        if let Some(script) = &self.config.script {
            cmd.arg(script);
        }
        for arg in &self.config.args {
            let arg = arg
                .replace("{input}", &image.to_string_lossy())
                .replace("{output}", &run_dir.to_string_lossy());
            cmd.arg(arg);
        }
        cmd.current_dir(run_dir);
        cmd
    }

    async fn invoke(&self, image: &Path, run_dir: &Path) -> Result<crate::PageLayout, SegmentationError> {
        let cmd = self.build_command(image, run_dir);
        let output = run_tool("kumiko", cmd, Duration::from_secs(self.config.timeout_secs)).await?;
        parse_output(&output.stdout)
    }

    /// Must be called with the shared directory lock held
    async fn segment_shared(&self, image: &Path, run_dir: &Path, shared: &Path) -> Result<Segmentation, SegmentationError> {
        let layout = self.invoke(image, run_dir).await?;
        let artifacts = discover_artifacts(shared)?;
        let artifacts = adopt_artifacts(artifacts, &run_dir.join("panels")).await?;
        pair_panels(layout, artifacts)
    }
}

#[async_trait]
impl Segmenter for KumikoSegmenter {
    async fn segment(&self, image: &Path, run_dir: &Path) -> Result<Segmentation, SegmentationError> {
        info!("Segmenting {}", image.display());

        let segmentation = match &self.config.panel_dir {
            PanelDirectory::Run { subdir } => {
                let layout = self.invoke(image, run_dir).await?;
                let artifacts = discover_artifacts(&run_dir.join(subdir))?;
                pair_panels(layout, artifacts)?
            }
            PanelDirectory::Shared { path } => {
                let _guard = SHARED_PANEL_DIR.lock().await;
                clear_directory(path).await?;
                let result = self.segment_shared(image, run_dir, path).await;
                if result.is_err() {
                    if let Err(e) = clear_directory(path).await {
                        warn!("Failed to clear {} after a failed run: {}", path.display(), e);
                    }
                }
                result?
            }
        };

        info!(
            "Detected {} panels on a {} page",
            segmentation.panel_count(),
            segmentation.dimensions
        );
        Ok(segmentation)
    }

    fn name(&self) -> &str {
        "kumiko"
    }
}

/// Remove stale panel images left in a shared directory by an earlier run
async fn clear_directory(dir: &Path) -> Result<(), SegmentationError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for stale in discover_artifacts(dir)? {
        tokio::fs::remove_file(&stale).await.map_err(|e| {
            SegmentationError::OutputMissing(format!("cannot clear {}: {}", stale.display(), e))
        })?;
    }
    Ok(())
}

/// Move artifacts out of a shared directory into the run's own directory,
/// keeping their order and file names.
async fn adopt_artifacts(artifacts: Vec<PathBuf>, dest: &Path) -> Result<Vec<PathBuf>, SegmentationError> {
    let missing = |e: std::io::Error| SegmentationError::OutputMissing(format!("cannot adopt panel images: {}", e));

    tokio::fs::create_dir_all(dest).await.map_err(missing)?;

    let mut adopted = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let Some(name) = artifact.file_name() else {
            continue;
        };
        let target = dest.join(name);
        if tokio::fs::rename(&artifact, &target).await.is_err() {
            // Cross-device moves fall back to copy + delete
            tokio::fs::copy(&artifact, &target).await.map_err(missing)?;
            tokio::fs::remove_file(&artifact).await.map_err(missing)?;
        }
        debug!("Adopted {} -> {}", artifact.display(), target.display());
        adopted.push(target);
    }
    Ok(adopted)
}
