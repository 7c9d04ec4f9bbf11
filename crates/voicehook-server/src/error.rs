//! Pipeline error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use voicehook_voice::VoiceError;
use voicehook_webhook::WebhookError;

/// Failures a voice interaction can end in, each with a stable status code.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("webhook unreachable: {0}")]
    RelayNetwork(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Transcription(_)
            | PipelineError::Synthesis(_)
            | PipelineError::RelayNetwork(_) => StatusCode::BAD_GATEWAY,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
            PipelineError::Storage(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<VoiceError> for PipelineError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Validation(msg) => PipelineError::Validation(msg),
            VoiceError::Transcription(msg) => PipelineError::Transcription(msg),
            VoiceError::Synthesis(msg) => PipelineError::Synthesis(msg),
            VoiceError::Config(msg) => PipelineError::Internal(msg),
            VoiceError::Storage(e) => PipelineError::Storage(e.to_string()),
        }
    }
}

impl From<WebhookError> for PipelineError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Validation(msg) => PipelineError::Validation(msg),
            WebhookError::Network(msg) => PipelineError::RelayNetwork(msg),
            WebhookError::Config(msg) => PipelineError::Internal(msg),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected: {}", self);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
