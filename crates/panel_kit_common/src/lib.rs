//! # Panel Kit Common - Shared Types and Utilities
//!
//! Value types, the external-tool runner and small file helpers shared by the
//! Panel Kit crates.
//!
//! ## Example
//!
//! ```rust
//! use panel_kit_common::{Dimensions, PanelOrigin};
//!
//! let page = Dimensions::new(800, 600).unwrap();
//! let origin = PanelOrigin::new(400, 0);
//!
//! assert_eq!(page.to_string(), "800x600");
//! assert_eq!(origin.geometry(), "+400+0");
//! ```

pub mod process;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for shared panel kit helpers
pub type Result<T> = std::result::Result<T, PanelKitError>;

/// Standard error type for shared value validation
#[derive(Error, Debug)]
pub enum PanelKitError {
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Full-page canvas size in pixels. Both sides are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PanelKitError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Whether a `size` sized rectangle at `origin` lies entirely inside the page.
    pub fn contains(&self, origin: PanelOrigin, size: PanelSize) -> bool {
        u64::from(origin.x) + u64::from(size.width) <= u64::from(self.width)
            && u64::from(origin.y) + u64::from(size.height) <= u64::from(self.height)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Top-left placement of a panel within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PanelOrigin {
    pub x: u32,
    pub y: u32,
}

impl PanelOrigin {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Offset in the `+x+y` form understood by compositing tools
    pub fn geometry(&self) -> String {
        format!("+{}+{}", self.x, self.y)
    }
}

/// Panel extent, when the segmentation tool reports one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PanelSize {
    pub width: u32,
    pub height: u32,
}

impl PanelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Where a source image comes from before it is ingested
#[derive(Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Raw bytes received directly (multipart upload, webhook binary body)
    Upload {
        bytes: Vec<u8>,
        filename: Option<String>,
    },
    /// Remote image to fetch over http(s)
    Url(String),
    /// Base64 text, optionally carrying a `data:` URI prefix
    InlineBase64(String),
}

impl SourceOrigin {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Url(_) => "url",
            Self::InlineBase64(_) => "inline_base64",
        }
    }
}

impl fmt::Debug for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload { bytes, filename } => f
                .debug_struct("Upload")
                .field("bytes", &bytes.len())
                .field("filename", filename)
                .finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::InlineBase64(data) => f.debug_tuple("InlineBase64").field(&data.len()).finish(),
        }
    }
}

/// Utility functions for files and sizes
pub mod utils {
    use super::Result;

    /// Raster extensions accepted as panel artifacts
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tif", "tiff"];

    /// Format file size in human-readable format
    pub fn format_file_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if bytes == 0 {
            return "0 B".to_string();
        }

        let base = 1024_f64;
        let exp = (bytes as f64).log(base).floor() as usize;
        let exp = exp.min(UNITS.len() - 1);

        let size = bytes as f64 / base.powi(exp as i32);
        format!("{:.1} {}", size, UNITS[exp])
    }

    /// Check if a file extension indicates a raster image
    pub fn is_image_file(filename: &str) -> bool {
        get_file_extension(filename)
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Get file extension from filename
    pub fn get_file_extension(filename: &str) -> Option<String> {
        std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Ensure output directory exists
    pub fn ensure_output_dir(path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }
}
