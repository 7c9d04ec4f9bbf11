use crate::artifact::ArtifactStore;
use crate::config::{ProviderConfig, TranscriptionSettings};
use crate::error::VoiceError;
use reqwest::multipart::{Form, Part};
use voicehook_types::{ArtifactKind, ArtifactRef, Transcription};

/// Maximum audio input size for STT (25 MiB, the provider's upload limit).
pub const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

const TRANSCRIPTION_PATH: &str = "audio/transcriptions";

/// Speech-to-text client for an OpenAI-compatible transcription endpoint.
#[derive(Debug, Clone)]
pub struct SttService {
    provider: ProviderConfig,
    settings: TranscriptionSettings,
    artifacts: ArtifactStore,
    http: reqwest::Client,
}

impl SttService {
    pub fn new(
        provider: ProviderConfig,
        settings: TranscriptionSettings,
        artifacts: ArtifactStore,
    ) -> Result<Self, VoiceError> {
        let http = provider.http_client()?;
        tracing::info!(
            model = %settings.model,
            language = %settings.language,
            "transcription client ready"
        );
        Ok(Self {
            provider,
            settings,
            artifacts,
            http,
        })
    }

    /// Transcribes one audio payload.
    ///
    /// The audio is staged as a temporary artifact for the upload and is
    /// released before this returns, whatever the outcome. A single attempt
    /// is made; retrying is up to the caller.
    pub async fn transcribe(
        &self,
        audio_data: &[u8],
        filename_hint: &str,
    ) -> Result<Transcription, VoiceError> {
        if audio_data.is_empty() {
            return Err(VoiceError::Validation("audio payload is empty".to_string()));
        }
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Validation(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        self.artifacts
            .with_scoped(
                audio_data,
                ArtifactKind::Upload,
                Some(filename_hint),
                |artifact| self.upload(artifact),
            )
            .await
    }

    async fn upload(&self, artifact: ArtifactRef) -> Result<Transcription, VoiceError> {
        let file = tokio::fs::File::open(artifact.path())
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to open staged audio: {}", e)))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to stat staged audio: {}", e)))?
            .len();

        let file_part = Part::stream_with_length(file, length)
            .file_name(artifact.filename().to_string())
            .mime_str(mime_for(artifact.filename()))
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.settings.model.clone())
            .text("language", self.settings.language.clone());

        tracing::info!(
            model = %self.settings.model,
            bytes = length,
            "sending transcription request"
        );

        let response = self
            .http
            .post(self.provider.endpoint(TRANSCRIPTION_PATH))
            .bearer_auth(&self.provider.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                VoiceError::Transcription(format!("transcription request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "transcription provider error: {}", body);
            let message = provider_error_message(&body)
                .unwrap_or_else(|| format!("transcription failed (HTTP {})", status.as_u16()));
            return Err(VoiceError::Transcription(message));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            VoiceError::Transcription(format!("unreadable transcription response: {}", e))
        })?;

        let text = json["text"]
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                VoiceError::Transcription("no usable 'text' field in response".to_string())
            })?;

        tracing::info!(chars = text.chars().count(), "transcription succeeded");
        Ok(Transcription {
            text: text.to_string(),
        })
    }
}

/// Pulls `error.message` out of a provider error body, if present.
pub(crate) fn provider_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json["error"]["message"]
        .as_str()
        .filter(|message| !message.is_empty())
        .map(String::from)
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("mp3") | Some("mpga") | Some("mpeg") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        _ => "audio/webm",
    }
}
