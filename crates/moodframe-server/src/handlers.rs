use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use moodframe_contracts::api::{
    HealthResponse, ImageUrlResponse, InlineTransformRequest, InlineTransformResponse,
    SpeechTagRequest, SpeechTagResponse, UploadResponse, UrlTransformRequest,
};
use moodframe_engine::normalize::{normalize, NormalizeSpec, NORMALIZED_MIME};
use moodframe_engine::{
    EmotionTagger, Error as EngineError, GeneratedImage, ImageSource, ImageTransformer,
    ImageVariator, KeyNamespace, ObjectStore, StoredImage,
};

use crate::errors::ApiError;
use crate::reporting::ErrorReporter;

pub const UPLOAD_PATH: &str = "/api/upload";
pub const INLINE_TRANSFORM_PATH: &str = "/api/gemini-img2img";
pub const URL_TRANSFORM_PATH: &str = "/api/img2img";
pub const VARIATION_PATH: &str = "/api/image_generator";
pub const SPEECH_PATH: &str = "/api/llm/speech";
pub const HEALTH_PATH: &str = "/api/health";

const PNG_MIME: &str = "image/png";

/// Adapters shared by every request.
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub inline_transformer: Arc<dyn ImageTransformer>,
    pub url_transformer: Arc<dyn ImageTransformer>,
    pub variator: Arc<dyn ImageVariator>,
    pub tagger: Arc<dyn EmotionTagger>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl AppState {
    fn reject(&self, endpoint: &'static str, label: &str, details: Option<String>) -> ApiError {
        self.reported(endpoint, ApiError::invalid_request(label, details))
    }

    /// Rejections raised while reading the body keep their own status, so an
    /// oversized payload answers 413 instead of the endpoint's 400 label.
    fn unreadable(
        &self,
        endpoint: &'static str,
        label: &str,
        status: StatusCode,
        details: String,
    ) -> ApiError {
        self.reported(endpoint, ApiError::unreadable_body(label, status, details))
    }

    fn failed(&self, endpoint: &'static str, label: &str, err: EngineError) -> ApiError {
        self.reported(endpoint, ApiError::from_engine(label, &err))
    }

    fn reported(&self, endpoint: &'static str, err: ApiError) -> ApiError {
        self.reporter.report(&err.report(endpoint));
        err
    }

    async fn store_output(&self, image: GeneratedImage) -> moodframe_engine::Result<StoredImage> {
        let GeneratedImage { bytes, mime_type } = image;
        self.store.put(KeyNamespace::Outputs, bytes, &mime_type).await
    }
}

#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Returns the first part named `name` when it carries a file.
async fn read_file_field(
    multipart: &mut Multipart,
    name: &str,
) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            return Ok(None);
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

async fn normalize_off_thread(
    bytes: Vec<u8>,
    spec: NormalizeSpec,
) -> moodframe_engine::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || normalize(&bytes, spec))
        .await
        .map_err(|err| EngineError::Internal(anyhow::anyhow!("normalize task failed: {err}")))?
}

#[tracing::instrument(skip_all)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    const LABEL: &str = "Upload failed";
    let mut multipart = multipart
        .map_err(|err| state.unreadable(UPLOAD_PATH, "Invalid file", err.status(), err.body_text()))?;
    let file = match read_file_field(&mut multipart, "file").await {
        Ok(Some(file)) => file,
        Ok(None) => return Err(state.reject(UPLOAD_PATH, "Invalid file", None)),
        Err(err) => {
            return Err(state.unreadable(UPLOAD_PATH, "Invalid file", err.status(), err.body_text()));
        }
    };
    tracing::debug!(
        file_name = %file.file_name,
        content_type = file.content_type.as_deref().unwrap_or("unknown"),
        size = file.bytes.len(),
        "received upload"
    );

    let png = normalize_off_thread(file.bytes, NormalizeSpec::UPLOAD)
        .await
        .map_err(|err| state.failed(UPLOAD_PATH, LABEL, err))?;
    let stored = state
        .store
        .put(KeyNamespace::Uploads, png, NORMALIZED_MIME)
        .await
        .map_err(|err| state.failed(UPLOAD_PATH, LABEL, err))?;

    tracing::info!(key = %stored.key, "stored normalized upload");
    Ok(Json(UploadResponse {
        public_url: stored.url,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn inline_transform(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InlineTransformRequest>, JsonRejection>,
) -> Result<Json<InlineTransformResponse>, ApiError> {
    const LABEL: &str = "Image generation failed";
    let Json(request) = payload.map_err(|err| {
        state.unreadable(INLINE_TRANSFORM_PATH, "Invalid JSON body", err.status(), err.body_text())
    })?;
    let source = request
        .into_source()
        .map_err(|problem| state.reject(INLINE_TRANSFORM_PATH, problem.label(), None))?;

    let image = state
        .inline_transformer
        .transform(&source)
        .await
        .map_err(|err| state.failed(INLINE_TRANSFORM_PATH, LABEL, err))?;
    let stored = state
        .store_output(image)
        .await
        .map_err(|err| state.failed(INLINE_TRANSFORM_PATH, LABEL, err))?;

    tracing::info!(
        backend = state.inline_transformer.name(),
        key = %stored.key,
        "stored transformed image"
    );
    Ok(Json(InlineTransformResponse {
        image_url: stored.url,
        success: true,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn url_transform(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UrlTransformRequest>, JsonRejection>,
) -> Result<Json<ImageUrlResponse>, ApiError> {
    const LABEL: &str = "Failed to generate image";
    let Json(request) = payload.map_err(|err| {
        state.unreadable(URL_TRANSFORM_PATH, "Invalid JSON body", err.status(), err.body_text())
    })?;
    let Some(image_url) = request.image_url() else {
        return Err(state.reject(URL_TRANSFORM_PATH, "Missing imageUrl", None));
    };
    match url::Url::parse(&image_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => {
            return Err(state.reject(
                URL_TRANSFORM_PATH,
                "Invalid imageUrl",
                Some(format!("unsupported scheme `{}`", parsed.scheme())),
            ));
        }
        Err(err) => {
            return Err(state.reject(URL_TRANSFORM_PATH, "Invalid imageUrl", Some(err.to_string())));
        }
    }

    let image = state
        .url_transformer
        .transform(&ImageSource::url(image_url))
        .await
        .map_err(|err| state.failed(URL_TRANSFORM_PATH, LABEL, err))?;
    let stored = state
        .store_output(image)
        .await
        .map_err(|err| state.failed(URL_TRANSFORM_PATH, LABEL, err))?;

    tracing::info!(
        backend = state.url_transformer.name(),
        key = %stored.key,
        "stored transformed image"
    );
    Ok(Json(ImageUrlResponse {
        image_url: stored.url,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn variation(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageUrlResponse>, ApiError> {
    const LABEL: &str = "Failed to generate image";
    let mut multipart = multipart.map_err(|err| {
        state.unreadable(VARIATION_PATH, "PNG image required", err.status(), err.body_text())
    })?;
    let file = match read_file_field(&mut multipart, "image").await {
        Ok(Some(file)) if file.content_type.as_deref() == Some(PNG_MIME) => file,
        Ok(Some(file)) => {
            let received = file.content_type.unwrap_or_else(|| "none".to_string());
            return Err(state.reject(
                VARIATION_PATH,
                "PNG image required",
                Some(format!("received content type {received}")),
            ));
        }
        Ok(None) => return Err(state.reject(VARIATION_PATH, "PNG image required", None)),
        Err(err) => {
            return Err(state.unreadable(
                VARIATION_PATH,
                "PNG image required",
                err.status(),
                err.body_text(),
            ));
        }
    };

    let png = normalize_off_thread(file.bytes, NormalizeSpec::VARIATION)
        .await
        .map_err(|err| state.failed(VARIATION_PATH, LABEL, err))?;
    let image = state
        .variator
        .vary(png)
        .await
        .map_err(|err| state.failed(VARIATION_PATH, LABEL, err))?;
    let stored = state
        .store_output(image)
        .await
        .map_err(|err| state.failed(VARIATION_PATH, LABEL, err))?;

    tracing::info!(
        backend = state.variator.name(),
        key = %stored.key,
        "stored image variation"
    );
    Ok(Json(ImageUrlResponse {
        image_url: stored.url,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn speech_tags(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SpeechTagRequest>, JsonRejection>,
) -> Result<Json<SpeechTagResponse>, ApiError> {
    let Json(request) = payload.map_err(|err| {
        state.unreadable(SPEECH_PATH, "Invalid JSON body", err.status(), err.body_text())
    })?;
    let Some(text) = request.text() else {
        return Err(state.reject(SPEECH_PATH, "Missing text", None));
    };

    let tags = state
        .tagger
        .tag(&text)
        .await
        .map_err(|err| state.failed(SPEECH_PATH, "Emotion tagging failed", err))?;
    tracing::info!(backend = state.tagger.name(), tag_count = tags.len(), "tagged speech");
    Ok(Json(SpeechTagResponse { tags }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
