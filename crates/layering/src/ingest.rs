//! Turns the three supported origins into one validated [`SourceImage`].
//!
//! Bytes from an upload, a fetched URL or an inline base64 payload all go
//! through the same format sniffing and header decode before the pipeline
//! touches them.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, ImageReader};
use panel_kit_common::utils::format_file_size;
use panel_kit_common::{Dimensions, SourceOrigin};
use reqwest::Client as HttpClient;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source image is empty")]
    Empty,
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid URL scheme. Only http:// and https:// are supported: {0}")]
    UnsupportedScheme(String),
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Fetching {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Unrecognised image format")]
    UnknownFormat,
    #[error("Undecodable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A validated raster image owned by one pipeline run
#[derive(Clone)]
pub struct SourceImage {
    bytes: Vec<u8>,
    format: ImageFormat,
    dimensions: Dimensions,
    filename: Option<String>,
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .field("dimensions", &self.dimensions)
            .field("filename", &self.filename)
            .finish()
    }
}

impl SourceImage {
    /// Validate raw bytes as a decodable raster image
    pub fn from_bytes(bytes: Vec<u8>, filename: Option<String>) -> Result<Self, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::Empty);
        }

        let reader = ImageReader::new(Cursor::new(bytes.as_slice())).with_guessed_format()?;
        let format = reader.format().ok_or(IngestError::UnknownFormat)?;
        let (width, height) = reader.into_dimensions()?;
        let dimensions = Dimensions::new(width, height).map_err(|_| IngestError::UnknownFormat)?;

        Ok(Self {
            bytes,
            format,
            dimensions,
            filename,
        })
    }

    /// Decode a base64 payload, with or without a `data:<mime>;base64,` prefix
    pub fn from_base64(payload: &str) -> Result<Self, IngestError> {
        let data = match payload.trim().strip_prefix("data:") {
            Some(uri) => uri.split_once(',').map(|(_, data)| data).unwrap_or_default(),
            None => payload.trim(),
        };
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD.decode(compact)?;
        Self::from_bytes(bytes, None)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// File extension matching the detected format
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

/// HTTP client used for URL origins
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: HttpClient,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<SourceImage, IngestError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(IngestError::UnsupportedScheme(url.to_string()));
        }
        info!("Downloading source image from {}", url);

        let fetch_err = |source| IngestError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(fetch_err)?;
        if !response.status().is_success() {
            return Err(IngestError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(fetch_err)?;
        debug!("Downloaded {}", format_file_size(bytes.len() as u64));

        let filename = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        SourceImage::from_bytes(bytes.to_vec(), filename)
    }
}

/// Resolve any origin into a validated source image
pub async fn ingest(origin: SourceOrigin, fetcher: &ImageFetcher) -> Result<SourceImage, IngestError> {
    debug!("Ingesting {} source", origin.kind());
    match origin {
        SourceOrigin::Upload { bytes, filename } => SourceImage::from_bytes(bytes, filename),
        SourceOrigin::Url(url) => fetcher.fetch(&url).await,
        SourceOrigin::InlineBase64(payload) => SourceImage::from_base64(&payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_is_validated() {
        let origin = SourceOrigin::Upload {
            bytes: png_bytes(32, 16),
            filename: Some("page.png".into()),
        };
        let image = ingest(origin, &fetcher()).await.unwrap();

        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!(image.dimensions(), Dimensions::new(32, 16).unwrap());
        assert_eq!(image.extension(), "png");
        assert_eq!(image.filename(), Some("page.png"));
    }

    #[tokio::test]
    async fn test_inline_base64_with_data_uri() {
        let encoded = STANDARD.encode(png_bytes(4, 4));
        let payload = format!("data:image/png;base64,{}", encoded);

        let image = ingest(SourceOrigin::InlineBase64(payload), &fetcher()).await.unwrap();
        assert_eq!(image.dimensions().width, 4);
    }

    #[test]
    fn test_plain_base64_with_line_breaks() {
        let encoded = STANDARD.encode(png_bytes(4, 4));
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{}\n{}\n", head, tail);

        assert!(SourceImage::from_base64(&wrapped).is_ok());
    }

    #[test]
    fn test_rejects_undecodable_bytes() {
        assert!(matches!(SourceImage::from_bytes(vec![], None), Err(IngestError::Empty)));
        assert!(matches!(
            SourceImage::from_bytes(b"hello, not an image".to_vec(), None),
            Err(IngestError::UnknownFormat)
        ));
        assert!(matches!(SourceImage::from_base64("@@@"), Err(IngestError::Base64(_))));
    }

    #[test]
    fn test_rejects_truncated_png() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(12);

        assert!(SourceImage::from_bytes(bytes, None).is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let err = ingest(SourceOrigin::Url("file:///etc/passwd".into()), &fetcher())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UnsupportedScheme(_)));
    }
}
