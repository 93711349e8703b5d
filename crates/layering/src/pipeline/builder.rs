use std::sync::Arc;

use compositing::{Compositor, LayerAggregator, MagickConfig, MagickDriver};
use segmentation::{KumikoConfig, KumikoSegmenter, Segmenter};

use crate::config::PipelineSettings;
use crate::error::BuildError;
use crate::ingest::ImageFetcher;
use crate::pipeline::Pipeline;

/// Builder for creating processing pipelines with a fluent API
#[derive(Default)]
pub struct PipelineBuilder {
    segmenter: Option<Arc<dyn Segmenter>>,
    compositor: Option<Arc<dyn Compositor>>,
    aggregator: Option<Arc<dyn LayerAggregator>>,
    magick: MagickConfig,
    settings: PipelineSettings,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segmenter (replaces any existing one)
    pub fn segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: Segmenter + 'static,
    {
        self.segmenter = Some(Arc::new(segmenter));
        self
    }

    /// Use Kumiko with the given configuration
    pub fn kumiko(self, config: KumikoConfig) -> Self {
        self.segmenter(KumikoSegmenter::new(config))
    }

    /// Set the per-panel compositor (replaces any existing one)
    pub fn compositor<C>(mut self, compositor: C) -> Self
    where
        C: Compositor + 'static,
    {
        self.compositor = Some(Arc::new(compositor));
        self
    }

    /// Set the layer aggregator (replaces any existing one)
    pub fn aggregator<A>(mut self, aggregator: A) -> Self
    where
        A: LayerAggregator + 'static,
    {
        self.aggregator = Some(Arc::new(aggregator));
        self
    }

    /// Share an aggregator the caller keeps a handle to
    pub fn aggregator_arc(mut self, aggregator: Arc<dyn LayerAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// ImageMagick settings used for any stage left unset
    pub fn magick(mut self, config: MagickConfig) -> Self {
        self.magick = config;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the pipeline, falling back to Kumiko and ImageMagick for unset stages
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let segmenter = self
            .segmenter
            .unwrap_or_else(|| Arc::new(KumikoSegmenter::new(KumikoConfig::default())) as Arc<dyn Segmenter>);

        let (compositor, aggregator) = match (self.compositor, self.aggregator) {
            (Some(compositor), Some(aggregator)) => (compositor, aggregator),
            (compositor, aggregator) => {
                let magick = Arc::new(MagickDriver::from_config(&self.magick)?);
                (
                    compositor.unwrap_or_else(|| magick.clone() as Arc<dyn Compositor>),
                    aggregator.unwrap_or_else(|| magick as Arc<dyn LayerAggregator>),
                )
            }
        };

        let fetcher = ImageFetcher::new(self.settings.fetch_timeout())?;

        Ok(Pipeline::new(segmenter, compositor, aggregator, fetcher, self.settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compositing::NativeCompositor;

    #[test]
    fn test_defaults_to_kumiko_and_magick() {
        let pipeline = PipelineBuilder::new().build().unwrap();
        let info = pipeline.info();

        assert!(info.contains("segmenter=kumiko"));
        assert!(info.contains("compositor=magick"));
        assert!(info.contains("aggregator=magick"));
        assert!(info.contains("concurrency=4"));
        assert!(info.contains("background=flatten_all"));
    }

    #[test]
    fn test_custom_compositor_keeps_magick_aggregator() {
        let pipeline = Pipeline::builder()
            .compositor(NativeCompositor::new())
            .settings(PipelineSettings {
                concurrency: 2,
                ..PipelineSettings::default()
            })
            .build()
            .unwrap();

        assert!(pipeline.info().contains("compositor=native"));
        assert!(pipeline.info().contains("aggregator=magick"));
        assert_eq!(pipeline.settings().concurrency, 2);
    }

    #[test]
    fn test_missing_magick_path_is_build_error() {
        let result = Pipeline::builder()
            .magick(MagickConfig {
                path: Some("/no/such/magick".into()),
                ..MagickConfig::default()
            })
            .build();

        assert!(matches!(result, Err(BuildError::Driver(_))));
    }
}
