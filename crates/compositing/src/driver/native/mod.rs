//! In-process compositor built on the `image` crate.
//!
//! Produces the same positioned canvases as the ImageMagick driver without an
//! external executable. It only implements [`Compositor`]; writing layered
//! containers is left to the ImageMagick aggregator.

use async_trait::async_trait;
use image::{RgbaImage, imageops};
use panel_kit_common::PanelSize;
use tracing::debug;

use crate::driver::{Compositor, DriverError};
use crate::sources::{FileSink, ImageSource, Sink, Source};
use crate::{PositionJob, PositionedPanel};

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCompositor;

impl NativeCompositor {
    pub fn new() -> Self {
        Self
    }

    /// Place the panel on a transparent canvas. Panels that would be clipped by
    /// the canvas edge are rejected so pixel extents are never altered.
    pub fn render(job: &PositionJob) -> Result<RgbaImage, DriverError> {
        let panel = image::open(&job.artifact)?.to_rgba8();
        job.check_fits(PanelSize::new(panel.width(), panel.height()))?;

        let mut canvas = RgbaImage::new(job.dimensions.width, job.dimensions.height);
        imageops::overlay(&mut canvas, &panel, i64::from(job.origin.x), i64::from(job.origin.y));
        Ok(canvas)
    }
}

#[async_trait]
impl Compositor for NativeCompositor {
    async fn position(&self, job: &PositionJob) -> Result<PositionedPanel, DriverError> {
        let source = ImageSource::new(&job.artifact);
        source.validate()?;
        let sink = FileSink::new(job.output_path());
        sink.validate()?;

        let owned_job = job.clone();
        let output = sink.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DriverError> {
            let canvas = Self::render(&owned_job)?;
            canvas.save(&output)?;
            Ok(())
        })
        .await
        .map_err(|e| DriverError::Execution(format!("Compositing task failed: {}", e)))??;

        debug!("Positioned panel {} at {}", job.index, job.origin.geometry());
        Ok(PositionedPanel {
            index: job.index,
            origin: job.origin,
            path: sink.path,
        })
    }

    fn name(&self) -> &str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use panel_kit_common::{Dimensions, PanelOrigin};
    use std::path::Path;

    fn write_panel(path: &Path, width: u32, height: u32, color: [u8; 4]) {
        RgbaImage::from_pixel(width, height, Rgba(color)).save(path).unwrap();
    }

    /// Top-left corner of the non-transparent region
    fn opaque_origin(canvas: &RgbaImage) -> Option<(u32, u32)> {
        let mut min: Option<(u32, u32)> = None;
        for (x, y, pixel) in canvas.enumerate_pixels() {
            if pixel[3] != 0 {
                min = Some(match min {
                    Some((mx, my)) => (mx.min(x), my.min(y)),
                    None => (x, y),
                });
            }
        }
        min
    }

    fn job(dir: &Path, index: usize, origin: PanelOrigin, artifact: &Path) -> PositionJob {
        PositionJob {
            index,
            dimensions: Dimensions::new(800, 600).unwrap(),
            origin,
            size: None,
            artifact: artifact.to_path_buf(),
            work_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_two_panel_page() {
        let temp = tempfile::tempdir().unwrap();
        let left = temp.path().join("page_0.png");
        let right = temp.path().join("page_1.png");
        write_panel(&left, 400, 600, [255, 0, 0, 255]);
        write_panel(&right, 400, 600, [0, 0, 255, 255]);

        let compositor = NativeCompositor::new();
        let p0 = compositor.position(&job(temp.path(), 0, PanelOrigin::new(0, 0), &left)).await.unwrap();
        let p1 = compositor.position(&job(temp.path(), 1, PanelOrigin::new(400, 0), &right)).await.unwrap();

        let c0 = image::open(&p0.path).unwrap().to_rgba8();
        let c1 = image::open(&p1.path).unwrap().to_rgba8();

        assert_eq!(c0.dimensions(), (800, 600));
        assert_eq!(c1.dimensions(), (800, 600));
        assert_eq!(opaque_origin(&c0), Some((0, 0)));
        assert_eq!(opaque_origin(&c1), Some((400, 0)));
        assert_eq!(c0.get_pixel(400, 0)[3], 0);
        assert_eq!(*c1.get_pixel(799, 599), Rgba([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn test_panel_pixels_are_not_scaled() {
        let temp = tempfile::tempdir().unwrap();
        let artifact = temp.path().join("page_0.png");
        let mut panel = RgbaImage::new(3, 2);
        panel.put_pixel(0, 0, Rgba([1, 2, 3, 255]));
        panel.put_pixel(2, 1, Rgba([9, 8, 7, 255]));
        panel.save(&artifact).unwrap();

        let canvas = NativeCompositor::render(&job(temp.path(), 0, PanelOrigin::new(10, 20), &artifact)).unwrap();

        assert_eq!(*canvas.get_pixel(10, 20), Rgba([1, 2, 3, 255]));
        assert_eq!(*canvas.get_pixel(12, 21), Rgba([9, 8, 7, 255]));
        assert_eq!(canvas.get_pixel(13, 21)[3], 0);
        assert_eq!(canvas.get_pixel(12, 22)[3], 0);
    }

    #[tokio::test]
    async fn test_rejects_panel_outside_canvas() {
        let temp = tempfile::tempdir().unwrap();
        let artifact = temp.path().join("page_0.png");
        write_panel(&artifact, 400, 600, [0, 255, 0, 255]);

        let err = NativeCompositor::new()
            .position(&job(temp.path(), 3, PanelOrigin::new(500, 0), &artifact))
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::OutOfBounds { index: 3, .. }));
    }

    #[tokio::test]
    async fn test_corrupt_artifact_fails() {
        let temp = tempfile::tempdir().unwrap();
        let artifact = temp.path().join("page_0.png");
        std::fs::write(&artifact, b"definitely not a png").unwrap();

        let err = NativeCompositor::new()
            .position(&job(temp.path(), 0, PanelOrigin::new(0, 0), &artifact))
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Image(_)));
    }
}
