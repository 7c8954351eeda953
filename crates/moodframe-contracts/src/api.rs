use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::images::ImageSource;
use crate::tags::EmotionTagSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineTransformRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Why an inline payload was refused before reaching a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlinePayloadError {
    Missing,
    NotAnImage,
    InvalidBase64,
}

impl InlinePayloadError {
    pub fn label(self) -> &'static str {
        match self {
            Self::Missing => "Missing imageBase64 or mimeType",
            Self::NotAnImage => "Invalid mimeType",
            Self::InvalidBase64 => "Invalid imageBase64",
        }
    }
}

impl InlineTransformRequest {
    /// Both fields present, `mimeType` an `image/*` type and `imageBase64`
    /// decodable standard base64.
    pub fn into_source(self) -> Result<ImageSource, InlinePayloadError> {
        let (Some(data), Some(mime_type)) = (non_blank(self.image_base64), non_blank(self.mime_type))
        else {
            return Err(InlinePayloadError::Missing);
        };
        let subtype = mime_type
            .get(..6)
            .filter(|prefix| prefix.eq_ignore_ascii_case("image/"))
            .map(|_| &mime_type[6..]);
        if subtype.map_or(true, |subtype| subtype.trim().is_empty()) {
            return Err(InlinePayloadError::NotAnImage);
        }
        match BASE64.decode(data.as_bytes()) {
            Ok(bytes) if !bytes.is_empty() => Ok(ImageSource::inline(mime_type, data)),
            _ => Err(InlinePayloadError::InvalidBase64),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlTransformRequest {
    #[serde(default)]
    pub image_url: Option<String>,
}

impl UrlTransformRequest {
    pub fn image_url(self) -> Option<String> {
        non_blank(self.image_url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechTagRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl SpeechTagRequest {
    pub fn text(self) -> Option<String> {
        non_blank(self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineTransformResponse {
    pub image_url: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlResponse {
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechTagResponse {
    pub tags: EmotionTagSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
