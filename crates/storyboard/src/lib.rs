//! Client for the storyboard generation webhook.
//!
//! A storyboard request carries a prompt, a panel count, a style tag and any
//! number of reference images. The webhook answers with either JSON pointing
//! at the generated page or the raw image itself; both are normalised into a
//! [`WebhookImage`] that the layering pipeline can ingest.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use panel_kit_common::SourceOrigin;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook URL not configured. Set webhook.url or N8N_WEBHOOK_URL")]
    NotConfigured,
    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to reach webhook: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Webhook response did not contain an image")]
    NoImage,
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    /// Storyboard webhook endpoint
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 60,
        }
    }
}

/// An image sent along with the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, WebhookError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| mime_for_extension(&ext.to_lowercase()))
            .map(str::to_string);

        Ok(Self {
            filename: path.file_name().map(|name| name.to_string_lossy().into_owned()),
            content_type,
            bytes,
        })
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryboardRequest {
    pub prompt: String,
    /// Number of panels to generate, forwarded as-is
    pub panels: String,
    pub style: String,
    pub images: Vec<ReferenceImage>,
}

impl StoryboardRequest {
    fn into_form(self) -> Result<Form, WebhookError> {
        let mut form = Form::new()
            .text("prompt", self.prompt)
            .text("panels", self.panels)
            .text("style", self.style);

        for (idx, image) in self.images.into_iter().enumerate() {
            let filename = image.filename.unwrap_or_else(|| format!("image_{}.png", idx));
            let mut part = Part::bytes(image.bytes).file_name(filename);
            if let Some(content_type) = image.content_type {
                part = part.mime_str(&content_type)?;
            }
            form = form.part("images", part);
        }
        Ok(form)
    }
}

/// The generated page, in whatever shape the webhook returned it
#[derive(Clone, PartialEq, Eq)]
pub enum WebhookImage {
    Url(String),
    /// Base64 payload, possibly a `data:` URI
    Base64(String),
    Binary {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

impl std::fmt::Debug for WebhookImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Base64(data) => write!(f, "Base64({} chars)", data.len()),
            Self::Binary { bytes, content_type } => f
                .debug_struct("Binary")
                .field("bytes", &bytes.len())
                .field("content_type", content_type)
                .finish(),
        }
    }
}

impl WebhookImage {
    pub fn into_source_origin(self) -> SourceOrigin {
        match self {
            Self::Url(url) => SourceOrigin::Url(url),
            Self::Base64(data) => SourceOrigin::InlineBase64(data),
            Self::Binary { bytes, .. } => SourceOrigin::Upload { bytes, filename: None },
        }
    }
}

/// Interpret a webhook response body as an image reference.
///
/// Image content types are taken as the image itself. JSON bodies are
/// searched depth-first for a URL, a `data:image/` URI, or a base64 payload
/// under an image-like key. Anything else non-empty is treated as raw bytes.
pub fn normalize_response(content_type: Option<&str>, body: &[u8]) -> Result<WebhookImage, WebhookError> {
    let content_type = content_type.map(|ct| ct.trim().to_lowercase());

    if let Some(ct) = content_type.as_deref().filter(|ct| ct.starts_with("image/")) {
        return Ok(WebhookImage::Binary {
            bytes: body.to_vec(),
            content_type: Some(ct.to_string()),
        });
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(json) => find_image(&json, None).ok_or(WebhookError::NoImage),
        Err(_) if content_type.as_deref().is_some_and(|ct| ct.contains("json")) => Err(WebhookError::NoImage),
        Err(_) if body.is_empty() => Err(WebhookError::NoImage),
        Err(_) => Ok(WebhookImage::Binary {
            bytes: body.to_vec(),
            content_type,
        }),
    }
}

fn is_url_key(key: &str) -> bool {
    ["url", "uri", "link", "href", "src"].iter().any(|k| key.contains(k))
}

fn is_base64_key(key: &str) -> bool {
    key.contains("base64") || key.contains("b64") || matches!(key, "image" | "data" | "binary" | "content")
}

fn find_image(value: &Value, key: Option<&str>) -> Option<WebhookImage> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            let key = key.map(str::to_lowercase).unwrap_or_default();
            if s.starts_with("data:image/") {
                Some(WebhookImage::Base64(s.to_string()))
            } else if s.starts_with("http://") || s.starts_with("https://") {
                (is_url_key(&key) || key == "image").then(|| WebhookImage::Url(s.to_string()))
            } else if is_base64_key(&key) && !s.is_empty() && STANDARD.decode(s).is_ok() {
                Some(WebhookImage::Base64(s.to_string()))
            } else {
                None
            }
        }
        Value::Array(items) => items.iter().find_map(|item| find_image(item, key)),
        Value::Object(map) => map.iter().find_map(|(k, v)| find_image(v, Some(k))),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: HttpClient,
    url: String,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let url = config.url.clone().ok_or(WebhookError::NotConfigured)?;
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Submit a storyboard request and return the generated page
    pub async fn post(&self, request: StoryboardRequest) -> Result<WebhookImage, WebhookError> {
        info!(
            "Requesting {} panel storyboard ({} reference images)",
            request.panels,
            request.images.len()
        );
        let form = request.into_form()?;
        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        debug!("Webhook answered {} bytes of {:?}", body.len(), content_type);

        normalize_response(content_type.as_deref(), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_image_content_type_is_binary() {
        let image = normalize_response(Some("image/png"), b"\x89PNG").unwrap();
        assert_eq!(
            image,
            WebhookImage::Binary {
                bytes: b"\x89PNG".to_vec(),
                content_type: Some("image/png".into())
            }
        );
    }

    #[test]
    fn test_json_url_and_nested_fields() {
        let top = normalize_response(Some("application/json"), &body(json!({"image_url": "https://cdn/x.png"}))).unwrap();
        assert_eq!(top, WebhookImage::Url("https://cdn/x.png".into()));

        let nested = normalize_response(
            Some("application/json"),
            &body(json!({"status": "ok", "result": [{"output": {"url": "https://cdn/y.png"}}]})),
        )
        .unwrap();
        assert_eq!(nested, WebhookImage::Url("https://cdn/y.png".into()));
    }

    #[test]
    fn test_json_base64_payloads() {
        let data_uri = normalize_response(None, &body(json!({"result": "data:image/png;base64,AAAA"}))).unwrap();
        assert_eq!(data_uri, WebhookImage::Base64("data:image/png;base64,AAAA".into()));

        let plain = normalize_response(None, &body(json!({"b64_json": "aGVsbG8="}))).unwrap();
        assert_eq!(plain, WebhookImage::Base64("aGVsbG8=".into()));
    }

    #[test]
    fn test_json_without_image_is_error() {
        let result = normalize_response(
            Some("application/json"),
            &body(json!({"message": "queued", "homepage": "not a url", "image": "???"})),
        );
        assert!(matches!(result, Err(WebhookError::NoImage)));
        assert!(matches!(normalize_response(None, b""), Err(WebhookError::NoImage)));
    }

    #[test]
    fn test_into_source_origin() {
        assert_eq!(
            WebhookImage::Url("https://cdn/x.png".into()).into_source_origin(),
            SourceOrigin::Url("https://cdn/x.png".into())
        );
        assert_eq!(
            WebhookImage::Binary {
                bytes: vec![1, 2],
                content_type: None
            }
            .into_source_origin(),
            SourceOrigin::Upload {
                bytes: vec![1, 2],
                filename: None
            }
        );
    }

    #[test]
    fn test_client_requires_url() {
        assert!(matches!(
            WebhookClient::new(&WebhookConfig::default()),
            Err(WebhookError::NotConfigured)
        ));
    }

    /// Serve one HTTP response and hand back the raw request
    async fn serve_once(status: &'static str, content_type: &'static str, reply: Vec<u8>) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/webhook", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                reply.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&reply).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (url, handle)
    }

    fn request() -> StoryboardRequest {
        StoryboardRequest {
            prompt: "a cat in space".into(),
            panels: "4".into(),
            style: "manga".into(),
            images: vec![ReferenceImage {
                filename: None,
                content_type: Some("image/png".into()),
                bytes: b"ref".to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn test_post_sends_multipart_and_normalizes() {
        let (url, server) = serve_once(
            "200 OK",
            "application/json",
            body(json!({"data": {"imageUrl": "https://cdn/page.png"}})),
        )
        .await;
        let client = WebhookClient::new(&WebhookConfig {
            url: Some(url),
            timeout_secs: 5,
        })
        .unwrap();

        let image = client.post(request()).await.unwrap();
        let sent = String::from_utf8_lossy(&server.await.unwrap()).to_string();

        assert_eq!(image, WebhookImage::Url("https://cdn/page.png".into()));
        assert!(sent.starts_with("POST /webhook"));
        assert!(sent.contains("multipart/form-data"));
        assert!(sent.contains("name=\"prompt\""));
        assert!(sent.contains("a cat in space"));
        assert!(sent.contains("name=\"images\"; filename=\"image_0.png\""));
    }

    #[tokio::test]
    async fn test_post_surfaces_error_status() {
        let (url, server) = serve_once("502 Bad Gateway", "text/plain", b"workflow crashed".to_vec()).await;
        let client = WebhookClient::new(&WebhookConfig {
            url: Some(url),
            timeout_secs: 5,
        })
        .unwrap();

        let err = client.post(request()).await.unwrap_err();
        server.await.unwrap();

        match err {
            WebhookError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "workflow crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
