//! voicehook server library logic.

pub mod api;
pub mod background;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use config::Config;
use orchestrator::Orchestrator;
use serde_json::{json, Value};
use session::SessionStore;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voicehook_types::SessionId;
use voicehook_voice::{ArtifactStore, StorageError, SttService, TtsService, VoiceError};
use voicehook_webhook::{WebhookClient, WebhookError};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The voice interaction pipeline.
    pub orchestrator: Orchestrator,
    /// Name of the cookie carrying the session token.
    pub cookie_name: String,
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("artifact storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("speech client setup failed: {0}")]
    Voice(#[from] VoiceError),
    #[error("webhook client setup failed: {0}")]
    Webhook(#[from] WebhookError),
}

impl AppState {
    /// Builds the pipeline from configuration.
    ///
    /// Opens (and optionally purges) the artifact directory. Does not check
    /// the configuration; call [`Config::validate`] first.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let artifacts = ArtifactStore::open(&config.storage.artifact_dir).await?;
        if config.storage.purge_on_start {
            let removed = artifacts.purge().await?;
            if removed > 0 {
                tracing::info!(count = removed, "purged artifacts from a previous run");
            }
        }

        let provider = config.speech.provider();
        let stt = SttService::new(
            provider.clone(),
            config.speech.transcription(),
            artifacts.clone(),
        )?;
        let tts = TtsService::new(provider, config.speech.synthesis(), artifacts.clone())?;
        let webhook = WebhookClient::new(config.webhook.clone())?;

        let orchestrator = Orchestrator::new(
            SessionStore::new(config.sessions.max_sessions),
            artifacts,
            stt,
            tts,
            webhook,
        );

        Ok(Self {
            orchestrator,
            cookie_name: config.sessions.cookie_name.clone(),
        })
    }

    /// Resolves the session named by the request's cookie, creating one if
    /// absent.
    pub async fn resolve_session(&self, headers: &HeaderMap) -> SessionId {
        let token = api::session_token(headers, &self.cookie_name);
        self.orchestrator.resolve_session(token.as_deref()).await
    }
}

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Body limit on audio upload routes: the transcription limit plus room for
/// multipart framing and text fields.
const MAX_UPLOAD_BODY_BYTES: usize = voicehook_voice::MAX_STT_INPUT_BYTES + 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/api/transcribe", post(api::transcribe_handler))
        .route("/api/webhook", post(api::webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/api/text-message", post(api::text_message_handler))
        .route("/api/speak", post(api::speak_handler))
        .route("/api/relay-reply", post(api::relay_reply_handler))
        .route("/api/reply", get(api::reply_handler))
        .route("/api/reply/audio", get(api::reply_audio_handler))
        .route("/api/audio/{filename}", get(api::audio_handler))
        .merge(upload_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
