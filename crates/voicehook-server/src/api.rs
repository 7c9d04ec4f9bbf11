//! API handlers for the voicehook server.
//!
//! Every handler resolves the caller's session first and answers with the
//! session cookie set, on success and on failure alike.

use crate::error::PipelineError;
use crate::orchestrator::{RelayOutcome, SpokenReply};
use crate::AppState;
use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Extension, FromRequest,
        Multipart, Path, Request,
    },
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use voicehook_types::{ArtifactRef, SessionId};
use voicehook_voice::VoiceOptions;

/// Filename assumed for uploads that carry none.
const DEFAULT_UPLOAD_FILENAME: &str = "recording.webm";

/// Response body for the transcribe-and-relay flows.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub success: bool,
    /// Text that was relayed to the webhook.
    pub text: String,
    /// Normalized webhook reply.
    #[serde(rename = "webhookReply")]
    pub webhook_reply: String,
}

impl From<RelayOutcome> for TranscribeResponse {
    fn from(outcome: RelayOutcome) -> Self {
        Self {
            success: true,
            text: outcome.text,
            webhook_reply: outcome.reply.text,
        }
    }
}

/// Response body carrying a reply and where to fetch its audio.
#[derive(Debug, Serialize, Deserialize)]
pub struct SpokenResponse {
    pub text: String,
    #[serde(rename = "audioUrl")]
    pub audio_url: String,
}

impl From<SpokenReply> for SpokenResponse {
    fn from(spoken: SpokenReply) -> Self {
        Self {
            text: spoken.text,
            audio_url: spoken.audio_url,
        }
    }
}

/// Response body for `GET /api/reply`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub text: String,
}

/// Request body for `POST /api/text-message`.
#[derive(Debug, Deserialize)]
pub struct TextMessageRequest {
    pub text: String,
    #[serde(alias = "webhookUrl")]
    pub webhook_url: String,
}

/// Request body for `POST /api/speak`.
#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Request body for `POST /api/relay-reply` and JSON calls to
/// `POST /api/webhook`.
///
/// The reply always lands in the caller's cookie session. Unknown fields
/// are ignored, so a body naming some other session cannot redirect it.
#[derive(Debug, Deserialize)]
pub struct RelayReplyRequest {
    pub text: String,
}

/// Audio and webhook target read from a multipart upload.
struct AudioUpload {
    audio: Vec<u8>,
    filename: String,
    webhook_url: String,
}

/// Extracts the session token from the request cookies.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
}

/// Renders `result` and attaches the session cookie.
fn respond<T: IntoResponse>(
    state: &AppState,
    session: &SessionId,
    result: Result<T, PipelineError>,
) -> Response {
    let mut response = result.into_response();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        state.cookie_name, session
    );
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(session = %session, "failed to encode session cookie: {}", e),
    }
    response
}

async fn read_audio_upload(mut multipart: Multipart) -> Result<AudioUpload, PipelineError> {
    let mut audio = None;
    let mut webhook_url = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Validation(format!("multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" | "file" => {
                let filename = field
                    .file_name()
                    .filter(|f| !f.is_empty())
                    .unwrap_or(DEFAULT_UPLOAD_FILENAME)
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    PipelineError::Validation(format!("failed to read audio: {}", e))
                })?;
                audio = Some((bytes.to_vec(), filename));
            }
            "webhook_url" | "webhookUrl" => {
                let text = field.text().await.map_err(|e| {
                    PipelineError::Validation(format!("failed to read webhook_url: {}", e))
                })?;
                webhook_url = Some(text.trim().to_string());
            }
            _ => {}
        }
    }

    let (audio, filename) =
        audio.ok_or_else(|| PipelineError::Validation("no audio file provided".to_string()))?;
    let webhook_url = webhook_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| PipelineError::Validation("no webhook URL provided".to_string()))?;

    Ok(AudioUpload {
        audio,
        filename,
        webhook_url,
    })
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PipelineError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| PipelineError::Validation(e.body_text()))
}

async fn transcribe_upload(
    state: &AppState,
    session: &SessionId,
    multipart: Multipart,
) -> Result<Json<TranscribeResponse>, PipelineError> {
    let upload = read_audio_upload(multipart).await?;
    tracing::info!(
        session = %session,
        bytes = upload.audio.len(),
        filename = %upload.filename,
        "received audio upload"
    );
    let outcome = state
        .orchestrator
        .transcribe_and_relay(session, &upload.audio, &upload.filename, &upload.webhook_url)
        .await?;
    Ok(Json(outcome.into()))
}

async fn relay_reply(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<RelayReplyRequest, PipelineError>,
) -> Response {
    let session = state.resolve_session(headers).await;
    let result = match payload {
        Ok(payload) => state
            .orchestrator
            .push_reply(&session, &payload.text)
            .await
            .map(|spoken| Json(SpokenResponse::from(spoken))),
        Err(e) => Err(e),
    };
    respond(state, &session, result)
}

/// Handler for `POST /api/transcribe`.
pub async fn transcribe_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = match multipart {
        Ok(multipart) => transcribe_upload(&state, &session, multipart).await,
        Err(e) => Err(PipelineError::Validation(e.body_text())),
    };
    respond(&state, &session, result)
}

/// Handler for `POST /api/text-message`.
pub async fn text_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TextMessageRequest>, JsonRejection>,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = match json_body(payload) {
        Ok(request) => state
            .orchestrator
            .relay_text(&session, &request.text, request.webhook_url.trim())
            .await
            .map(|outcome| Json(TranscribeResponse::from(outcome))),
        Err(e) => Err(e),
    };
    respond(&state, &session, result)
}

/// Handler for `POST /api/speak`.
pub async fn speak_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = match json_body(payload) {
        Ok(request) => {
            let options = VoiceOptions {
                voice: request.voice,
                instructions: request.instructions,
            };
            state
                .orchestrator
                .speak(&session, &request.text, &options)
                .await
                .map(|spoken| Json(SpokenResponse::from(spoken)))
        }
        Err(e) => Err(e),
    };
    respond(&state, &session, result)
}

/// Handler for `POST /api/relay-reply`.
pub async fn relay_reply_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RelayReplyRequest>, JsonRejection>,
) -> Response {
    relay_reply(&state, &headers, json_body(payload)).await
}

/// Handler for `POST /api/webhook`.
///
/// Multipart bodies are treated as an audio upload, JSON bodies as a pushed
/// reply.
pub async fn webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> Response {
    let headers = request.headers().clone();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let session = state.resolve_session(&headers).await;
        let result = match Multipart::from_request(request, &()).await {
            Ok(multipart) => transcribe_upload(&state, &session, multipart).await,
            Err(e) => Err(PipelineError::Validation(e.body_text())),
        };
        respond(&state, &session, result)
    } else if content_type.starts_with("application/json") {
        let payload = Json::<RelayReplyRequest>::from_request(request, &()).await;
        relay_reply(&state, &headers, json_body(payload)).await
    } else {
        let session = state.resolve_session(&headers).await;
        let message = if content_type.is_empty() {
            "missing content type".to_string()
        } else {
            format!("unsupported content type: {}", content_type)
        };
        respond(
            &state,
            &session,
            Err::<(), _>(PipelineError::Validation(message)),
        )
    }
}

/// Handler for `GET /api/reply`.
pub async fn reply_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = state
        .orchestrator
        .reply(&session)
        .map(|reply| Json(ReplyResponse { text: reply.text }));
    respond(&state, &session, result)
}

/// Handler for `GET /api/reply/audio`.
pub async fn reply_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = state
        .orchestrator
        .reply_audio(&session)
        .await
        .map(|spoken| Json(SpokenResponse::from(spoken)));
    respond(&state, &session, result)
}

/// Handler for `GET /api/audio/{filename}`.
pub async fn audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Response {
    let session = state.resolve_session(&headers).await;
    let result = match state.orchestrator.audio_artifact(&session, &filename).await {
        Ok(artifact) => Ok(serve_artifact(&artifact).await),
        Err(e) => Err(e),
    };
    respond(&state, &session, result)
}

async fn serve_artifact(artifact: &ArtifactRef) -> Response {
    let response = ServeFile::new(artifact.path())
        .oneshot(Request::new(Body::empty()))
        .await
        .unwrap_or_else(|never| match never {});

    let mut response = response.map(Body::new);
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    }
    response
}
