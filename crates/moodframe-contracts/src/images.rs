use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Where a vendor should read the input image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline {
        mime_type: String,
        data_base64: String,
    },
    Url(String),
}

impl ImageSource {
    pub fn inline(mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        Self::Inline {
            mime_type: mime_type.into(),
            data_base64: data_base64.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Dereferenceable form: the URL itself, or a `data:` URL for inline bytes.
    pub fn to_dereferenceable(&self) -> String {
        match self {
            Self::Inline {
                mime_type,
                data_base64,
            } => format!("data:{mime_type};base64,{data_base64}"),
            Self::Url(url) => url.clone(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn new(bytes: Vec<u8>, mime_type: Option<&str>) -> Self {
        Self {
            bytes,
            mime_type: normalize_image_mime(mime_type),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: DEFAULT_IMAGE_MIME.to_string(),
        }
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Classified vendor answer for an image request.
#[derive(Debug)]
pub enum TransformOutcome<E> {
    Success { image: GeneratedImage },
    NoImage,
    Error { cause: E },
}

impl<E> TransformOutcome<E> {
    pub fn into_result(self, no_image: impl FnOnce() -> E) -> Result<GeneratedImage, E> {
        match self {
            Self::Success { image } => Ok(image),
            Self::NoImage => Err(no_image()),
            Self::Error { cause } => Err(cause),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyNamespace {
    Uploads,
    Outputs,
}

impl KeyNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploads => "uploads",
            Self::Outputs => "outputs",
        }
    }

    pub fn object_key(self, extension: &str) -> String {
        format!("{}/{}.{}", self.as_str(), Uuid::new_v4(), extension)
    }
}

impl fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub sha256: String,
}

pub fn normalize_image_mime(raw: Option<&str>) -> String {
    let normalized = raw
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/png" | "image/webp" | "image/gif" => normalized,
        _ => DEFAULT_IMAGE_MIME.to_string(),
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn object_keys_are_namespaced_and_pairwise_distinct() {
        let keys: HashSet<String> = (0..10_000)
            .map(|_| KeyNamespace::Uploads.object_key("png"))
            .collect();
        assert_eq!(keys.len(), 10_000);
        assert!(keys
            .iter()
            .all(|key| key.starts_with("uploads/") && key.ends_with(".png")));
    }

    #[test]
    fn output_keys_use_output_prefix() {
        let key = KeyNamespace::Outputs.object_key("jpg");
        let id = key
            .strip_prefix("outputs/")
            .and_then(|rest| rest.strip_suffix(".jpg"))
            .unwrap_or_default();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn inline_source_dereferences_to_data_url() {
        let source = ImageSource::inline("image/jpeg", "QUJD");
        assert_eq!(source.to_dereferenceable(), "data:image/jpeg;base64,QUJD");
        let source = ImageSource::url("https://example.com/a.png");
        assert_eq!(source.to_dereferenceable(), "https://example.com/a.png");
    }

    #[test]
    fn generated_image_mime_falls_back_to_png() {
        assert_eq!(GeneratedImage::new(vec![1], None).mime_type, "image/png");
        assert_eq!(
            GeneratedImage::new(vec![1], Some("application/octet-stream")).mime_type,
            "image/png"
        );
        let jpeg = GeneratedImage::new(vec![1], Some("Image/JPEG; charset=binary"));
        assert_eq!(jpeg.mime_type, "image/jpeg");
        assert_eq!(jpeg.extension(), "jpg");
    }

    #[test]
    fn only_raster_mimes_survive_normalization() {
        for raw in ["image/svg+xml", "image/x-icon", "text/html", "image/"] {
            assert_eq!(normalize_image_mime(Some(raw)), "image/png", "{raw}");
        }
        assert_eq!(normalize_image_mime(Some("image/jpg")), "image/jpeg");
        assert_eq!(normalize_image_mime(Some("IMAGE/WEBP")), "image/webp");
        assert_eq!(normalize_image_mime(Some("image/gif")), "image/gif");

        let svg = GeneratedImage::new(vec![b'<'], Some("image/svg+xml"));
        assert_eq!(svg.mime_type, "image/png");
        assert_eq!(svg.extension(), "png");
    }

    #[test]
    fn outcome_maps_variants_to_results() {
        let ok: TransformOutcome<String> = TransformOutcome::Success {
            image: GeneratedImage::png(vec![7]),
        };
        assert_eq!(ok.into_result(|| "none".to_string()).map(|i| i.bytes), Ok(vec![7]));

        let empty: TransformOutcome<String> = TransformOutcome::NoImage;
        assert_eq!(
            empty.into_result(|| "none".to_string()).map(|i| i.bytes),
            Err("none".to_string())
        );

        let failed: TransformOutcome<String> = TransformOutcome::Error {
            cause: "boom".to_string(),
        };
        assert_eq!(
            failed.into_result(|| "none".to_string()).map(|i| i.bytes),
            Err("boom".to_string())
        );
    }
}
