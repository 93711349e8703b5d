//! # Comic Page Layering
//!
//! Splits a comic page into its panels and writes a layered file with one
//! layer per panel, each at its original position, plus a flattened
//! background layer underneath.
//!
//! ## Core Features
//!
//! - **Three source origins**: uploaded bytes, an http(s) URL, or inline base64
//! - **Pluggable stages**: segmenter, compositor and aggregator are traits
//! - **Isolated runs**: every run works in its own scratch directory, removed on exit
//! - **Structured failures**: every error names the stage it happened in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layering::{Pipeline, SourceOrigin};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Kumiko for segmentation, ImageMagick for compositing
//! let pipeline = Pipeline::builder().build()?;
//!
//! let bytes = std::fs::read("page.png")?;
//! let origin = SourceOrigin::Upload { bytes, filename: Some("page.png".into()) };
//! let delivery = pipeline.run(origin, "page.psd").await?;
//!
//! println!("{} panels, {} layers", delivery.panel_count, delivery.layer_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use layering::{Pipeline, PipelineSettings};
//! use compositing::{BackgroundLayer, NativeCompositor};
//!
//! let pipeline = Pipeline::builder()
//!     .compositor(NativeCompositor::new())
//!     .settings(PipelineSettings {
//!         concurrency: 8,
//!         background: BackgroundLayer::FlattenFirstTwo,
//!         ..PipelineSettings::default()
//!     })
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod types;
pub mod workspace;

pub use config::PipelineSettings;
pub use error::{BuildError, ErrorKind, ErrorReport, PipelineError, Result, Stage};
pub use ingest::{ImageFetcher, IngestError, SourceImage, ingest};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use types::{Delivery, PanelPlacement, RunState};
pub use workspace::RunWorkspace;

pub use panel_kit_common::SourceOrigin;
