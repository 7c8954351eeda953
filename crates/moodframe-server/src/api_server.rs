use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use moodframe_engine::gemini::GeminiTransformer;
use moodframe_engine::openai::{OpenAiEmotionTagger, OpenAiVariator};
use moodframe_engine::replicate::ReplicateTransformer;
use moodframe_engine::storage::S3ObjectStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{
    health, inline_transform, speech_tags, upload, url_transform, variation, AppState,
    HEALTH_PATH, INLINE_TRANSFORM_PATH, SPEECH_PATH, UPLOAD_PATH, URL_TRANSFORM_PATH,
    VARIATION_PATH,
};
use crate::reporting::{ErrorReporter, IncidentLogReporter, TracingReporter};

/// Wires the production adapters from resolved configuration.
pub fn build_state(config: &AppConfig) -> anyhow::Result<Arc<AppState>> {
    let reporter: Arc<dyn ErrorReporter> = match &config.incident_log {
        Some(path) => Arc::new(IncidentLogReporter::new(path)),
        None => Arc::new(TracingReporter),
    };
    let openai = &config.openai;
    Ok(Arc::new(AppState {
        store: Arc::new(S3ObjectStore::new(config.s3.clone())),
        inline_transformer: Arc::new(
            GeminiTransformer::new(config.gemini.clone()).context("gemini client")?,
        ),
        url_transformer: Arc::new(
            ReplicateTransformer::new(config.replicate.clone()).context("replicate client")?,
        ),
        variator: Arc::new(OpenAiVariator::new(openai).context("openai variation client")?),
        tagger: Arc::new(OpenAiEmotionTagger::new(openai).context("openai chat client")?),
        reporter,
    }))
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    // Browser clients call from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(UPLOAD_PATH, post(upload))
        .route(INLINE_TRANSFORM_PATH, post(inline_transform))
        .route(URL_TRANSFORM_PATH, post(url_transform))
        .route(VARIATION_PATH, post(variation))
        .route(SPEECH_PATH, post(speech_tags))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(bind: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("moodframe listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("moodframe stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install ctrl-c handler: {err}");
        std::future::pending::<()>().await;
    }
}
