pub mod builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use compositing::{AggregateJob, Compositor, LayerAggregator, PositionJob, PositionedPanel};
use futures::{StreamExt, future, stream};
use panel_kit_common::SourceOrigin;
use segmentation::{Segmentation, Segmenter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::ingest::{ImageFetcher, SourceImage, ingest};
use crate::types::{Delivery, PanelPlacement, RunState};
use crate::workspace::RunWorkspace;

pub use builder::PipelineBuilder;

/// Turns one page image into one layered file, one panel per layer.
///
/// Every run gets its own [`RunWorkspace`]; it is released whether the run
/// is delivered or fails.
pub struct Pipeline {
    segmenter: Arc<dyn Segmenter>,
    compositor: Arc<dyn Compositor>,
    aggregator: Arc<dyn LayerAggregator>,
    fetcher: ImageFetcher,
    settings: PipelineSettings,
}

/// Logs and checks state transitions of a single run
struct RunTracker {
    id: Uuid,
    state: RunState,
}

impl RunTracker {
    fn new(id: Uuid) -> Self {
        info!(run_id = %id, "Run {}", RunState::Ingested);
        Self {
            id,
            state: RunState::Ingested,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        match next {
            RunState::Failed { stage } => warn!(run_id = %self.id, "Run failed during {}", stage),
            _ => info!(run_id = %self.id, "Run {}", next),
        }
        self.state = next;
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(
        segmenter: Arc<dyn Segmenter>,
        compositor: Arc<dyn Compositor>,
        aggregator: Arc<dyn LayerAggregator>,
        fetcher: ImageFetcher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            segmenter,
            compositor,
            aggregator,
            fetcher,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        format!(
            "Pipeline: segmenter={}, compositor={}, aggregator={}, concurrency={}, background={}, format={}",
            self.segmenter.name(),
            self.compositor.name(),
            self.aggregator.name(),
            self.settings.concurrency(),
            self.settings.background,
            self.settings.output_format,
        )
    }

    /// Run the whole pipeline and write the layered file to `output`.
    ///
    /// Nothing is written to `output` unless every stage succeeds.
    pub async fn run(&self, origin: SourceOrigin, output: impl AsRef<Path>) -> Result<Delivery> {
        let started_at = Utc::now();
        let image = ingest(origin, &self.fetcher).await.inspect_err(|e| {
            warn!("Ingestion failed: {}", e);
        })?;

        let workspace = RunWorkspace::create(self.settings.work_root.as_deref()).map_err(|e| {
            PipelineError::IngestionFailed {
                diagnostic: format!("Failed to create run workspace: {}", e),
            }
        })?;
        let mut run = RunTracker::new(workspace.id());
        debug!("Source {:?}", image);

        let result = self.execute(&image, &workspace, output.as_ref(), &mut run).await;
        let result = result.map(|mut delivery| {
            delivery.started_at = started_at;
            delivery.finished_at = Utc::now();
            delivery
        });

        match &result {
            Ok(_) => run.advance(RunState::Delivered),
            Err(e) => run.advance(RunState::Failed { stage: e.stage() }),
        }
        workspace.release();
        result
    }

    async fn execute(
        &self,
        image: &SourceImage,
        workspace: &RunWorkspace,
        output: &Path,
        run: &mut RunTracker,
    ) -> Result<Delivery> {
        let source_path = workspace.write_source(image).map_err(|e| PipelineError::IngestionFailed {
            diagnostic: format!("Failed to materialise source image: {}", e),
        })?;

        let segmentation = self.segmenter.segment(&source_path, workspace.path()).await?;
        if segmentation.dimensions != image.dimensions() {
            warn!(
                "Segmenter reported {} for a {} source image",
                segmentation.dimensions,
                image.dimensions()
            );
        }
        info!(
            "{} detected {} panels on a {} page",
            self.segmenter.name(),
            segmentation.panel_count(),
            segmentation.dimensions
        );
        run.advance(RunState::Segmented);

        let layers_dir = workspace.subdir("layers").map_err(|e| PipelineError::CompositeFailed {
            panel: 0,
            diagnostic: format!("Failed to create layer directory: {}", e),
        })?;
        let positioned = self.composite(&segmentation, &layers_dir).await?;
        run.advance(RunState::Composited);

        let staged = workspace
            .path()
            .join(format!("layered.{}", self.settings.output_format.extension()));
        let layer_count = self.aggregate(positioned, &staged).await?;
        run.advance(RunState::Aggregated);

        let artifact = deliver(&staged, output).await?;

        Ok(Delivery {
            run_id: workspace.id(),
            artifact,
            format: self.settings.output_format,
            dimensions: segmentation.dimensions,
            panel_count: segmentation.panel_count(),
            layer_count,
            geometry: segmentation
                .panels
                .iter()
                .map(|panel| PanelPlacement {
                    index: panel.index,
                    origin: panel.origin,
                    size: panel.size,
                })
                .collect(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        })
    }

    /// Position every panel, in parallel, returning them in panel order
    async fn composite(&self, segmentation: &Segmentation, layers_dir: &Path) -> Result<Vec<PositionedPanel>> {
        let compositor = self.compositor.as_ref();
        let jobs = segmentation.panels.iter().map(|panel| PositionJob {
            index: panel.index,
            dimensions: segmentation.dimensions,
            origin: panel.origin,
            size: panel.size,
            artifact: panel.artifact.clone(),
            work_dir: layers_dir.to_path_buf(),
        });

        let failed = AtomicBool::new(false);
        let mut results = stream::iter(jobs)
            .take_while(|_| future::ready(!failed.load(Ordering::Relaxed)))
            .map(move |job| async move {
                compositor
                    .position(&job)
                    .await
                    .map_err(|e| PipelineError::CompositeFailed {
                        panel: job.index,
                        diagnostic: e.diagnostic(),
                    })
            })
            .buffer_unordered(self.settings.concurrency());

        // After a failure no new job starts, but jobs already running are
        // awaited so none writes into the workspace once it is released.
        let mut positioned = Vec::with_capacity(segmentation.panel_count());
        let mut first_error = None;
        while let Some(result) = results.next().await {
            match result {
                Ok(panel) => positioned.push(panel),
                Err(e) => {
                    failed.store(true, Ordering::Relaxed);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        positioned.sort_by_key(|panel| panel.index);
        debug!("Composited {} panels with {}", positioned.len(), compositor.name());
        Ok(positioned)
    }

    async fn aggregate(&self, layers: Vec<PositionedPanel>, staged: &Path) -> Result<usize> {
        if layers.is_empty() {
            return Err(PipelineError::aggregation(
                "no panels detected, refusing to write an empty layered file",
            ));
        }

        let expected = layers.len() + 1;
        let job = AggregateJob {
            layers,
            background: self.settings.background,
            output: staged.to_path_buf(),
        };
        let output = self
            .aggregator
            .aggregate(&job)
            .await
            .map_err(|e| PipelineError::aggregation(e.diagnostic()))?;

        if output.layer_count != expected {
            return Err(PipelineError::aggregation(format!(
                "expected {} layers, aggregator wrote {}",
                expected, output.layer_count
            )));
        }
        if !output.path.is_file() {
            return Err(PipelineError::aggregation(format!(
                "aggregator reported {} but no file was written",
                output.path.display()
            )));
        }
        Ok(output.layer_count)
    }
}

/// Move the staged artifact out of the run workspace
async fn deliver(staged: &Path, output: &Path) -> Result<PathBuf> {
    let failed = |e: std::io::Error| PipelineError::aggregation(format!("Failed to deliver {}: {}", output.display(), e));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }
    if tokio::fs::rename(staged, output).await.is_err() {
        // Cross-device moves need a copy
        tokio::fs::copy(staged, output).await.map_err(failed)?;
    }
    info!("Delivered {}", output.display());
    Ok(output.to_path_buf())
}
