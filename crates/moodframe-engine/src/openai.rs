use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use moodframe_contracts::tags::EMOTION_VOCABULARY;
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::{
    api_base_or_default, build_http_client, download_image, response_json_or_error,
    transport_error, EmotionTagSet, EmotionTagger, Error, GeneratedImage, ImageVariator, Result,
    TransformOutcome,
};

const PROVIDER: &str = "OpenAI";

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_TEXT_MODEL: &str = "gpt-3.5-turbo";
pub const VARIATION_SIZE: &str = "256x256";
const TAGGING_TEMPERATURE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub api_base: Option<String>,
    pub text_model: Option<String>,
    pub timeout: Duration,
}

struct OpenAiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl OpenAiClient {
    fn new(settings: &OpenAiSettings) -> Result<Self> {
        Ok(Self {
            api_base: api_base_or_default(settings.api_base.as_deref(), DEFAULT_OPENAI_API_BASE),
            api_key: settings.api_key.clone(),
            http: build_http_client(settings.timeout)?,
        })
    }

    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, endpoint, err))?;
        response_json_or_error(PROVIDER, response).await
    }
}

/// Speech-transcript emotion tagging over chat completions.
pub struct OpenAiEmotionTagger {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmotionTagger {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        Ok(Self {
            client: OpenAiClient::new(settings)?,
            model: settings
                .text_model
                .as_deref()
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .unwrap_or(DEFAULT_OPENAI_TEXT_MODEL)
                .to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completion_text(response: &Value) -> String {
        response
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }
}

pub fn emotion_tagging_prompt(transcript: &str) -> String {
    let vocabulary = EMOTION_VOCABULARY
        .iter()
        .map(|word| format!("'{word}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "다음 문장에서 느껴지는 감정을 키워드로 1~3개 추출해 주세요.\n\
감정 키워드는 {vocabulary} 등의 단어 중에서 선택해주세요.\n\
문장: \"{transcript}\"\n\
결과:"
    )
}

#[async_trait]
impl EmotionTagger for OpenAiEmotionTagger {
    fn name(&self) -> &str {
        "openai"
    }

    async fn tag(&self, transcript: &str) -> Result<EmotionTagSet> {
        let endpoint = format!("{}/chat/completions", self.client.api_base);
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": emotion_tagging_prompt(transcript) }],
            "temperature": TAGGING_TEMPERATURE,
        });
        let started = Instant::now();
        let response = self.client.post_json(&endpoint, &payload).await?;
        let raw = Self::completion_text(&response);
        let tags = EmotionTagSet::from_completion(&raw);
        tracing::info!(
            provider = PROVIDER,
            model = %self.model,
            tag_count = tags.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "emotion tagging returned"
        );
        Ok(tags)
    }
}

/// Image variation endpoint; expects a square PNG.
pub struct OpenAiVariator {
    client: OpenAiClient,
}

impl OpenAiVariator {
    pub fn new(settings: &OpenAiSettings) -> Result<Self> {
        Ok(Self {
            client: OpenAiClient::new(settings)?,
        })
    }

    async fn classify(&self, response: &Value) -> TransformOutcome<Error> {
        let Some(item) = response
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_object)
        else {
            return TransformOutcome::NoImage;
        };

        if let Some(b64) = item.get("b64_json").and_then(Value::as_str) {
            return match BASE64.decode(b64.as_bytes()) {
                Ok(bytes) if !bytes.is_empty() => TransformOutcome::Success {
                    image: GeneratedImage::png(bytes),
                },
                Ok(_) => TransformOutcome::NoImage,
                Err(err) => TransformOutcome::Error {
                    cause: Error::vendor(PROVIDER, format!("image base64 decode failed: {err}")),
                },
            };
        }

        match item.get("url").and_then(Value::as_str).map(str::trim) {
            Some(url) if !url.is_empty() => {
                match download_image(&self.client.http, PROVIDER, url).await {
                    Ok(image) => TransformOutcome::Success { image },
                    Err(cause) => TransformOutcome::Error { cause },
                }
            }
            _ => TransformOutcome::NoImage,
        }
    }
}

#[async_trait]
impl ImageVariator for OpenAiVariator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn vary(&self, png: Vec<u8>) -> Result<GeneratedImage> {
        let endpoint = format!("{}/images/variations", self.client.api_base);
        let part = MultipartPart::bytes(png)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|err| Error::Internal(anyhow::anyhow!("invalid multipart mime: {err}")))?;
        let form = MultipartForm::new()
            .part("image", part)
            .text("n", "1")
            .text("size", VARIATION_SIZE);

        let started = Instant::now();
        let response = self
            .client
            .http
            .post(&endpoint)
            .bearer_auth(&self.client.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, &endpoint, err))?;
        let response_payload = response_json_or_error(PROVIDER, response).await?;
        tracing::info!(
            provider = PROVIDER,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "image variation returned"
        );
        self.classify(&response_payload)
            .await
            .into_result(|| Error::no_image(PROVIDER))
    }
}
