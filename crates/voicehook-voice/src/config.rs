use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_INSTRUCTIONS: &str =
    "Mów po polsku z polskim akcentem. Speak in Polish language with a natural Polish accent.";

fn default_timeout_secs() -> u64 {
    60
}

/// Connection settings for a speech provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Upper bound on a single provider call, in seconds. Default: 60.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, VoiceError> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))
    }
}

/// Fixed parameters sent with every transcription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionSettings {
    pub model: String,
    /// ISO-639-1 language hint passed to the provider.
    pub language: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: "pl".to_string(),
        }
    }
}

/// Default synthesis parameters. Immutable once the service is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSettings {
    pub model: String,
    pub voice: String,
    pub instructions: String,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-tts".to_string(),
            voice: "ash".to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

/// Per-call overrides for a single synthesis request.
///
/// Unset or blank fields fall back to the service's [`SynthesisSettings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOptions {
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl VoiceOptions {
    /// Returns the effective `(voice, instructions)` pair for one call.
    pub fn resolve<'a>(&'a self, defaults: &'a SynthesisSettings) -> (&'a str, &'a str) {
        let pick = |value: &'a Option<String>, fallback: &'a str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        (
            pick(&self.voice, &defaults.voice),
            pick(&self.instructions, &defaults.instructions),
        )
    }
}
