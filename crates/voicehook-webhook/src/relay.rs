use crate::error::WebhookError;
use crate::normalize::classify;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use voicehook_types::Reply;

fn default_timeout_secs() -> u64 {
    30
}

fn default_source() -> String {
    "n8n-voice-interface".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Settings for outbound webhook calls. The target URL is per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Upper bound on a single webhook call, in seconds. Default: 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `metadata.source` sent in every envelope.
    #[serde(default = "default_source")]
    pub source: String,
    /// `metadata.version` sent in every envelope.
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            source: default_source(),
            version: default_version(),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    transcription: &'a str,
    timestamp: String,
    metadata: Metadata<'a>,
}

#[derive(Serialize)]
struct Metadata<'a> {
    source: &'a str,
    version: &'a str,
}

/// Forwards text to a workflow webhook and collects its reply.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    config: WebhookConfig,
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| WebhookError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Sends `text` to `webhook_url` and normalizes the answer.
    ///
    /// A webhook that answers with a non-success status still yields a
    /// reply, whose text describes the failure. Only validation problems
    /// and transport failures (unreachable host, timeout, unreadable body)
    /// are returned as errors.
    pub async fn relay(&self, webhook_url: &str, text: &str) -> Result<Reply, WebhookError> {
        let url = validate_webhook_url(webhook_url)?;

        let envelope = Envelope {
            transcription: text,
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: Metadata {
                source: &self.config.source,
                version: &self.config.version,
            },
        };

        tracing::info!(host = url.host_str().unwrap_or_default(), "relaying to webhook");

        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|e| WebhookError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                "webhook returned an error status: {}",
                body
            );
            return Ok(Reply::new(format!(
                "Workflow webhook returned an error (HTTP {})",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WebhookError::Network(format!("failed to read webhook reply: {}", e)))?;

        let shape = classify(&body);
        tracing::info!(shape = shape.label(), "webhook replied");
        Ok(shape.into_reply())
    }
}

/// Checks that `webhook_url` is a non-empty absolute HTTP(S) URL.
pub fn validate_webhook_url(webhook_url: &str) -> Result<Url, WebhookError> {
    let trimmed = webhook_url.trim();
    if trimmed.is_empty() {
        return Err(WebhookError::Validation(
            "webhook URL must not be empty".to_string(),
        ));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| WebhookError::Validation(format!("invalid webhook URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WebhookError::Validation(format!(
            "unsupported webhook URL scheme: {}",
            other
        ))),
    }
}
