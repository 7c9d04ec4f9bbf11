use crate::artifact::ArtifactStore;
use crate::config::{ProviderConfig, SynthesisSettings, VoiceOptions};
use crate::error::VoiceError;
use serde::Serialize;
use voicehook_types::{ArtifactKind, ArtifactRef};

const SPEECH_PATH: &str = "audio/speech";

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    instructions: &'a str,
}

/// Service for generating speech from text.
///
/// The service's [`SynthesisSettings`] are fixed at construction. Per-call
/// voice and instruction changes travel as [`VoiceOptions`] arguments, so
/// concurrent calls never see each other's overrides.
#[derive(Debug, Clone)]
pub struct TtsService {
    provider: ProviderConfig,
    settings: SynthesisSettings,
    artifacts: ArtifactStore,
    http: reqwest::Client,
}

impl TtsService {
    pub fn new(
        provider: ProviderConfig,
        settings: SynthesisSettings,
        artifacts: ArtifactStore,
    ) -> Result<Self, VoiceError> {
        let http = provider.http_client()?;
        tracing::info!(
            model = %settings.model,
            voice = %settings.voice,
            "synthesis client ready"
        );
        Ok(Self {
            provider,
            settings,
            artifacts,
            http,
        })
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// Synthesizes speech for `text` and stores it as a new artifact.
    ///
    /// The caller owns the returned artifact and is responsible for
    /// releasing it once superseded.
    pub async fn synthesize(
        &self,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<ArtifactRef, VoiceError> {
        if text.trim().is_empty() {
            return Err(VoiceError::Validation(
                "text to synthesize must not be empty".to_string(),
            ));
        }

        let (voice, instructions) = options.resolve(&self.settings);
        let request = SpeechRequest {
            model: &self.settings.model,
            voice,
            input: text,
            instructions,
        };

        tracing::info!(
            model = %self.settings.model,
            voice,
            chars = text.chars().count(),
            "sending synthesis request"
        );

        let response = self
            .http
            .post(self.provider.endpoint(SPEECH_PATH))
            .bearer_auth(&self.provider.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("synthesis request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "synthesis provider error: {}", body);
            return Err(VoiceError::Synthesis(format!(
                "provider returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read audio payload: {}", e)))?;
        if audio.is_empty() {
            return Err(VoiceError::Synthesis(
                "provider returned an empty audio payload".to_string(),
            ));
        }

        let artifact = self
            .artifacts
            .create(&audio, ArtifactKind::Speech, None)
            .await?;
        tracing::info!(
            filename = artifact.filename(),
            bytes = audio.len(),
            "synthesis succeeded"
        );
        Ok(artifact)
    }
}
