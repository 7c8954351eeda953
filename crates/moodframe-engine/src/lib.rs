use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

pub mod gemini;
pub mod normalize;
pub mod openai;
pub mod replicate;
pub mod storage;

pub use moodframe_contracts::images::{
    GeneratedImage, ImageSource, KeyNamespace, StoredImage, TransformOutcome,
};
pub use moodframe_contracts::tags::EmotionTagSet;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy shared by adapters, the normalizer and the object store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("{provider} returned no image")]
    NoImageReturned { provider: String },

    #[error("{provider} {message}")]
    Vendor { provider: String, message: String },

    #[error("object store write failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn vendor(provider: &str, message: impl Into<String>) -> Self {
        Self::Vendor {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn no_image(provider: &str) -> Self {
        Self::NoImageReturned {
            provider: provider.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::NoImageReturned { .. } => "NoImageReturned",
            Self::Vendor { .. } => "VendorError",
            Self::Storage(_) => "StorageError",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

/// Generative image backend that rewrites one input image.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    fn name(&self) -> &str;
    async fn transform(&self, source: &ImageSource) -> Result<GeneratedImage>;
}

/// Backend producing a variation of a PNG image.
#[async_trait]
pub trait ImageVariator: Send + Sync {
    fn name(&self) -> &str;
    async fn vary(&self, png: Vec<u8>) -> Result<GeneratedImage>;
}

#[async_trait]
pub trait EmotionTagger: Send + Sync {
    fn name(&self) -> &str;
    async fn tag(&self, transcript: &str) -> Result<EmotionTagSet>;
}

/// Write-once blob storage exposing public read URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        namespace: KeyNamespace,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredImage>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<HttpClient> {
    let client = HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build vendor HTTP client")?;
    Ok(client)
}

pub(crate) fn api_base_or_default(raw: Option<&str>, default: &str) -> String {
    raw.map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn transport_error(provider: &str, endpoint: &str, err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Error::vendor(provider, format!("{kind} ({endpoint}): {}", err.without_url()))
}

pub(crate) async fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| Error::vendor(provider, format!("response body read failed: {}", err.without_url())))?;
    if !status.is_success() {
        return Err(Error::vendor(
            provider,
            format!("request failed ({code}): {}", truncate_text(&body, 512)),
        ));
    }
    serde_json::from_str(&body)
        .map_err(|err| Error::vendor(provider, format!("returned invalid JSON payload: {err}")))
}

pub(crate) async fn download_image(
    http: &HttpClient,
    provider: &str,
    url: &str,
) -> Result<GeneratedImage> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|err| transport_error(provider, "image download", err))?;
    if !response.status().is_success() {
        let code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::vendor(
            provider,
            format!("image download failed ({code}): {}", truncate_text(&body, 512)),
        ));
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|err| Error::vendor(provider, format!("failed reading image bytes: {}", err.without_url())))?
        .to_vec();
    if bytes.is_empty() {
        return Err(Error::no_image(provider));
    }
    Ok(GeneratedImage::new(bytes, mime_type.as_deref()))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_follow_taxonomy() {
        assert_eq!(Error::InvalidRequest("x".into()).code(), "InvalidRequest");
        assert_eq!(Error::UnsupportedFormat("x".into()).code(), "UnsupportedFormat");
        assert_eq!(Error::no_image("gemini").code(), "NoImageReturned");
        assert_eq!(Error::vendor("openai", "quota").code(), "VendorError");
        assert_eq!(Error::Storage("denied".into()).code(), "StorageError");
        assert_eq!(
            Error::from(anyhow::anyhow!("unexpected")).code(),
            "InternalError"
        );
    }

    #[test]
    fn vendor_error_message_names_provider() {
        let err = Error::vendor("Replicate", "request failed (401): unauthorized");
        assert_eq!(err.to_string(), "Replicate request failed (401): unauthorized");
        assert_eq!(Error::no_image("Gemini").to_string(), "Gemini returned no image");
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn api_base_trims_trailing_slash_and_falls_back() {
        assert_eq!(
            api_base_or_default(Some(" http://localhost:9000/ "), "https://x"),
            "http://localhost:9000"
        );
        assert_eq!(api_base_or_default(Some("  "), "https://x"), "https://x");
        assert_eq!(api_base_or_default(None, "https://x"), "https://x");
    }
}
