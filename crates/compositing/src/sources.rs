use std::fmt::Debug;
use std::path::{Path, PathBuf};

use panel_kit_common::utils;

use crate::driver::DriverError;

/// Generic trait for compositing inputs
pub trait Source: Debug + Clone {
    /// Type-specific validation that the source is readable
    fn validate(&self) -> Result<(), DriverError>;

    /// Get a human-readable description of this source
    fn description(&self) -> String;
}

/// Generic trait for compositing outputs
pub trait Sink: Debug + Clone {
    /// Type-specific validation that the sink can be written to
    fn validate(&self) -> Result<(), DriverError>;

    /// Get a human-readable description of this sink
    fn description(&self) -> String;
}

/// A raster file on disk, such as a panel image produced by segmentation
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub path: PathBuf,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for ImageSource {
    fn validate(&self) -> Result<(), DriverError> {
        if !self.path.is_file() {
            return Err(DriverError::Execution(format!("Input image not found: {}", self.path.display())));
        }
        let name = self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !utils::is_image_file(name) {
            return Err(DriverError::Execution(format!("Not a raster image: {}", self.path.display())));
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("Image: {}", self.path.display())
    }
}

/// A single output file
#[derive(Debug, Clone)]
pub struct FileSink {
    pub path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn validate(&self) -> Result<(), DriverError> {
        // Check if parent directory exists, create if needed
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            utils::ensure_output_dir(parent)
                .map_err(|e| DriverError::Execution(format!("Cannot create output directory: {}", e)))?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("File: {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_source_validation() {
        let temp = tempfile::tempdir().unwrap();
        let png = temp.path().join("panel.png");
        let json = temp.path().join("panel.json");
        std::fs::write(&png, b"x").unwrap();
        std::fs::write(&json, b"{}").unwrap();

        assert!(ImageSource::new(&png).validate().is_ok());
        assert!(ImageSource::new(&json).validate().is_err());
        assert!(ImageSource::new(temp.path().join("missing.png")).validate().is_err());
    }

    #[test]
    fn test_file_sink_creates_parent() {
        let temp = tempfile::tempdir().unwrap();
        let sink = FileSink::new(temp.path().join("a/b/out.psd"));

        sink.validate().unwrap();
        assert!(temp.path().join("a/b").is_dir());
        assert!(sink.description().ends_with("out.psd"));
    }
}
