use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

use crate::{
    api_base_or_default, build_http_client, download_image, response_json_or_error,
    transport_error, truncate_text, Error, GeneratedImage, ImageSource, ImageTransformer, Result,
    TransformOutcome,
};

const PROVIDER: &str = "Replicate";

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REPLICATE_MODEL: &str =
    "lucataco/realistic-vision-v5.1:2c8e954decbf70b7607a4414e5785ef9e4de4b8c51d50fb8b8b349160e0ef6bb";

pub const SIMPLIFIED_BACKGROUND_INSTRUCTION: &str = "Transform the input image into a simplified outdoor background by removing all unnecessary or complex elements.
Only retain minimal, natural components such as trees, skies, mountains, or grass.
Remove any people, animals, vehicles, or man-made objects.
The result should be a clean, calm, and uncluttered background inspired by the input.";

/// Numeric knobs of the img2img diffusion run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionParams {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f64,
    pub strength: f64,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            width: 768,
            height: 768,
            steps: 30,
            guidance: 6.5,
            strength: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicateSettings {
    pub api_token: String,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub params: DiffusionParams,
}

impl ReplicateSettings {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(api_token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_token: api_token.into(),
            api_base: None,
            model: None,
            timeout,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            params: DiffusionParams::default(),
        }
    }
}

/// URL-based image transform running a diffusion model prediction.
pub struct ReplicateTransformer {
    api_base: String,
    api_token: String,
    model: String,
    instruction: String,
    params: DiffusionParams,
    timeout: Duration,
    poll_interval: Duration,
    http: HttpClient,
}

#[derive(Debug, PartialEq)]
enum PredictionState {
    Succeeded(Vec<String>),
    Pending(Option<String>),
    Failed(String),
}

impl ReplicateTransformer {
    pub fn new(settings: ReplicateSettings) -> Result<Self> {
        Ok(Self {
            api_base: api_base_or_default(
                settings.api_base.as_deref(),
                DEFAULT_REPLICATE_API_BASE,
            ),
            api_token: settings.api_token,
            model: settings
                .model
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty())
                .unwrap_or_else(|| DEFAULT_REPLICATE_MODEL.to_string()),
            instruction: SIMPLIFIED_BACKGROUND_INSTRUCTION.to_string(),
            params: settings.params,
            timeout: settings.timeout,
            poll_interval: settings.poll_interval.max(Duration::from_millis(10)),
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

    fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.api_base)
    }

    fn build_payload(&self, image: String) -> Value {
        json!({
            "version": self.model,
            "input": {
                "image": image,
                "prompt": self.instruction,
                "width": self.params.width,
                "height": self.params.height,
                "steps": self.params.steps,
                "guidance": self.params.guidance,
                "strength": self.params.strength,
            },
        })
    }

    fn prediction_state(prediction: &Value) -> PredictionState {
        let status = prediction
            .get("status")
            .and_then(Value::as_str)
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        match status.as_str() {
            "succeeded" => {
                let mut urls = Vec::new();
                if let Some(output) = prediction.get("output") {
                    extract_output_urls(output, &mut urls);
                }
                PredictionState::Succeeded(urls)
            }
            "starting" | "processing" => PredictionState::Pending(
                prediction
                    .get("urls")
                    .and_then(|urls| urls.get("get"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            ),
            _ => {
                let reason = prediction
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("status '{status}'"));
                PredictionState::Failed(truncate_text(&reason, 512))
            }
        }
    }

    async fn poll_prediction(&self, poll_url: &str, started: Instant) -> Result<Value> {
        loop {
            if started.elapsed() >= self.timeout {
                return Err(Error::vendor(
                    PROVIDER,
                    format!(
                        "prediction timed out after {:.1}s",
                        self.timeout.as_secs_f64()
                    ),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|err| transport_error(PROVIDER, "prediction poll", err))?;
            let prediction = response_json_or_error(PROVIDER, response).await?;
            if !matches!(
                Self::prediction_state(&prediction),
                PredictionState::Pending(_)
            ) {
                return Ok(prediction);
            }
        }
    }

    async fn run_prediction(&self, source: &ImageSource) -> TransformOutcome<Error> {
        let endpoint = self.predictions_endpoint();
        let payload = self.build_payload(source.to_dereferenceable());
        let started = Instant::now();

        let response = match self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return TransformOutcome::Error {
                    cause: transport_error(PROVIDER, &endpoint, err),
                }
            }
        };
        let mut prediction = match response_json_or_error(PROVIDER, response).await {
            Ok(prediction) => prediction,
            Err(cause) => return TransformOutcome::Error { cause },
        };

        if let PredictionState::Pending(poll_url) = Self::prediction_state(&prediction) {
            let Some(poll_url) = poll_url else {
                return TransformOutcome::Error {
                    cause: Error::vendor(PROVIDER, "prediction missing poll URL"),
                };
            };
            prediction = match self.poll_prediction(&poll_url, started).await {
                Ok(prediction) => prediction,
                Err(cause) => return TransformOutcome::Error { cause },
            };
        }

        let prediction_id = prediction
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::info!(
            provider = PROVIDER,
            model = %self.model,
            prediction_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prediction settled"
        );

        match Self::prediction_state(&prediction) {
            PredictionState::Succeeded(urls) => match urls.first() {
                Some(url) => match download_image(&self.http, PROVIDER, url).await {
                    Ok(image) => TransformOutcome::Success { image },
                    Err(cause) => TransformOutcome::Error { cause },
                },
                None => TransformOutcome::NoImage,
            },
            PredictionState::Failed(reason) => TransformOutcome::Error {
                cause: Error::vendor(PROVIDER, format!("prediction failed: {reason}")),
            },
            PredictionState::Pending(_) => TransformOutcome::Error {
                cause: Error::vendor(PROVIDER, "prediction did not settle"),
            },
        }
    }
}

#[async_trait]
impl ImageTransformer for ReplicateTransformer {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn transform(&self, source: &ImageSource) -> Result<GeneratedImage> {
        self.run_prediction(source)
            .await
            .into_result(|| Error::no_image(PROVIDER))
    }
}

fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && trimmed.starts_with("http")
                && !out.iter().any(|existing| existing == trimmed)
            {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_output_urls(row, out);
            }
        }
        Value::Object(obj) => {
            if let Some(url) = obj.get("url") {
                extract_output_urls(url, out);
            }
            if let Some(output) = obj.get("output") {
                extract_output_urls(output, out);
            }
        }
        _ => {}
    }
}
