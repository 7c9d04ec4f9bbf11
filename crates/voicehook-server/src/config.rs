//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use voicehook_voice::{
    ProviderConfig, SynthesisSettings, TranscriptionSettings, DEFAULT_API_BASE_URL,
};
use voicehook_webhook::WebhookConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session table settings.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Speech provider settings.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Outbound webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Artifact storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voicehook_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Upper bound on live sessions. Oldest-created sessions are evicted
    /// beyond it.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Name of the cookie carrying the session token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

/// Speech provider configuration shared by transcription and synthesis.
#[derive(Clone, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer credential. Required; usually supplied via `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Upper bound on a single provider call, in seconds.
    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding temporary audio artifacts.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Whether to delete artifacts left by a previous process at startup.
    #[serde(default = "default_true")]
    pub purge_on_start: bool,

    /// Seconds between sweeps for unreferenced artifacts. 0 disables it.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_sessions() -> usize {
    1000
}

fn default_cookie_name() -> String {
    "session_id".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_transcription_model() -> String {
    TranscriptionSettings::default().model
}

fn default_language() -> String {
    TranscriptionSettings::default().language
}

fn default_synthesis_model() -> String {
    SynthesisSettings::default().model
}

fn default_voice() -> String {
    SynthesisSettings::default().voice
}

fn default_instructions() -> String {
    SynthesisSettings::default().instructions
}

fn default_speech_timeout_secs() -> u64 {
    60
}

fn default_artifact_dir() -> PathBuf {
    std::env::temp_dir().join("voicehook")
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            cookie_name: default_cookie_name(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: String::new(),
            transcription_model: default_transcription_model(),
            language: default_language(),
            synthesis_model: default_synthesis_model(),
            voice: default_voice(),
            instructions: default_instructions(),
            timeout_secs: default_speech_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            purge_on_start: true,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"[REDACTED]")
            .field("transcription_model", &self.transcription_model)
            .field("language", &self.language)
            .field("synthesis_model", &self.synthesis_model)
            .field("voice", &self.voice)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SpeechConfig {
    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig::new(&self.api_base_url, &self.api_key)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn transcription(&self) -> TranscriptionSettings {
        TranscriptionSettings {
            model: self.transcription_model.clone(),
            language: self.language.clone(),
        }
    }

    pub fn synthesis(&self) -> SynthesisSettings {
        SynthesisSettings {
            model: self.synthesis_model.clone(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// No provider credential was configured.
    #[error("speech provider API key is not set (use OPENAI_API_KEY or [speech].api_key)")]
    MissingApiKey,

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speech.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "sessions.max_sessions must be at least 1".to_string(),
            ));
        }
        let cookie = &self.sessions.cookie_name;
        if cookie.is_empty()
            || !cookie
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ConfigError::Invalid(format!(
                "sessions.cookie_name {:?} is not a valid cookie name",
                cookie
            )));
        }
        if self.speech.timeout_secs == 0 || self.webhook.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOICEHOOK_HOST` overrides `server.host`
/// - `VOICEHOOK_PORT` (or `PORT`) overrides `server.port`
/// - `VOICEHOOK_LOG_LEVEL` overrides `logging.level`
/// - `VOICEHOOK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOICEHOOK_MAX_SESSIONS` overrides `sessions.max_sessions`
/// - `OPENAI_API_KEY` overrides `speech.api_key`
/// - `STT_MODEL` overrides `speech.transcription_model`
/// - `TTS_MODEL` overrides `speech.synthesis_model`
/// - `VOICEHOOK_ARTIFACT_DIR` overrides `storage.artifact_dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

fn apply_env_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = var("VOICEHOOK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("VOICEHOOK_PORT").or_else(|| var("PORT")) {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("VOICEHOOK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("VOICEHOOK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(max) = var("VOICEHOOK_MAX_SESSIONS") {
        if let Ok(parsed) = max.parse() {
            config.sessions.max_sessions = parsed;
        }
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.speech.api_key = key;
    }
    if let Some(model) = var("STT_MODEL") {
        config.speech.transcription_model = model;
    }
    if let Some(model) = var("TTS_MODEL") {
        config.speech.synthesis_model = model;
    }
    if let Some(dir) = var("VOICEHOOK_ARTIFACT_DIR") {
        config.storage.artifact_dir = PathBuf::from(dir);
    }
    config
}
