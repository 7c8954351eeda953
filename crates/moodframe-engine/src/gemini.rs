use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::{
    api_base_or_default, build_http_client, response_json_or_error, transport_error, Error,
    GeneratedImage, ImageSource, ImageTransformer, Result, TransformOutcome,
};

const PROVIDER: &str = "Gemini";

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

pub const DREAMLIKE_BACKGROUND_INSTRUCTION: &str = "Transform the input image into a bright and dreamlike outdoor background, removing all unnecessary or complex elements.
Preserve only minimal, natural components such as softly glowing skies, gentle trees, distant mountains, or serene grass fields.
Eliminate all people, animals, vehicles, and man-made objects.
The final result should evoke a calm, ethereal, and uncluttered atmosphere inspired by nature.";

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
}

/// Inline-bytes image transform backed by `generateContent`.
pub struct GeminiTransformer {
    api_base: String,
    api_key: String,
    model: String,
    instruction: String,
    http: HttpClient,
}

impl GeminiTransformer {
    pub fn new(settings: GeminiSettings) -> Result<Self> {
        Ok(Self {
            api_base: api_base_or_default(settings.api_base.as_deref(), DEFAULT_GEMINI_API_BASE),
            api_key: settings.api_key,
            model: settings
                .model
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_IMAGE_MODEL.to_string()),
            instruction: DREAMLIKE_BACKGROUND_INSTRUCTION.to_string(),
            http: build_http_client(settings.timeout)?,
        })
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(&self, mime_type: &str, data_base64: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": self.instruction },
                    { "inlineData": { "mimeType": mime_type, "data": data_base64 } },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    /// Looks for the first inline image part of the first candidate.
    fn classify(response: &Value) -> TransformOutcome<Error> {
        let parts = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = match BASE64.decode(data.as_bytes()) {
                Ok(bytes) => bytes,
                Err(err) => {
                    return TransformOutcome::Error {
                        cause: Error::vendor(PROVIDER, format!("image base64 decode failed: {err}")),
                    }
                }
            };
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str);
            return TransformOutcome::Success {
                image: GeneratedImage::new(bytes, mime_type),
            };
        }
        TransformOutcome::NoImage
    }
}

#[async_trait]
impl ImageTransformer for GeminiTransformer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn transform(&self, source: &ImageSource) -> Result<GeneratedImage> {
        let ImageSource::Inline {
            mime_type,
            data_base64,
        } = source
        else {
            return Err(Error::InvalidRequest(
                "Gemini backend requires an inline image payload".to_string(),
            ));
        };

        let endpoint = self.endpoint();
        let payload = self.build_payload(mime_type, data_base64);
        let started = Instant::now();
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, &endpoint, err))?;
        let response_payload = response_json_or_error(PROVIDER, response).await?;
        tracing::info!(
            provider = PROVIDER,
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "image transform returned"
        );
        Self::classify(&response_payload).into_result(|| Error::no_image(PROVIDER))
    }
}
