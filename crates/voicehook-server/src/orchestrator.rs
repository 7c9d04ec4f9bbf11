//! The voice interaction pipeline.
//!
//! Composes transcription, webhook relay, synthesis and the session store
//! into the request flows:
//!
//! - transcribe-and-relay: audio → text → webhook → reply, with synthesis
//!   scheduled in the background;
//! - relay of typed text, which skips transcription;
//! - speak / pushed reply: text stored as the reply and synthesized inline;
//! - retrieval of the last reply and its audio, synthesizing on demand.
//!
//! Background synthesis never touches an already returned response. Its
//! failure is logged and leaves the session's artifact as it was.

use crate::error::PipelineError;
use crate::session::{ArtifactUpdate, SessionStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use voicehook_types::{ArtifactRef, Reply, SessionId};
use voicehook_voice::{ArtifactStore, SttService, TtsService, VoiceOptions};
use voicehook_webhook::{validate_webhook_url, WebhookClient};

/// Path prefix under which artifacts are served.
pub const AUDIO_ROUTE_PREFIX: &str = "/api/audio";

/// Public URL of an artifact.
pub fn audio_url(artifact: &ArtifactRef) -> String {
    format!("{}/{}", AUDIO_ROUTE_PREFIX, artifact.filename())
}

/// Result of a flow that relayed text to the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Text sent to the webhook (the transcription, or the typed message).
    pub text: String,
    pub reply: Reply,
}

/// A reply with a URL for its synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenReply {
    pub text: String,
    pub audio_url: String,
}

/// Runs voice interactions against shared, immutable services.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    sessions: SessionStore,
    artifacts: ArtifactStore,
    stt: Arc<SttService>,
    tts: Arc<TtsService>,
    webhook: Arc<WebhookClient>,
}

impl Orchestrator {
    pub fn new(
        sessions: SessionStore,
        artifacts: ArtifactStore,
        stt: SttService,
        tts: TtsService,
        webhook: WebhookClient,
    ) -> Self {
        Self {
            sessions,
            artifacts,
            stt: Arc::new(stt),
            tts: Arc::new(tts),
            webhook: Arc::new(webhook),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Resolves (or creates) the caller's session and enforces the session
    /// bound, releasing artifacts of evicted sessions.
    pub async fn resolve_session(&self, token: Option<&str>) -> SessionId {
        let id = self.sessions.resolve(token);
        let evicted = self.sessions.evict_overflow(self.sessions.max_sessions());
        for state in evicted {
            if let Some(spoken) = state.artifact {
                self.artifacts.release(&spoken.artifact).await;
            }
        }
        id
    }

    /// Transcribes `audio`, relays the text and stores the reply.
    ///
    /// Synthesis of the reply is scheduled in the background and not awaited.
    pub async fn transcribe_and_relay(
        &self,
        session: &SessionId,
        audio: &[u8],
        filename: &str,
        webhook_url: &str,
    ) -> Result<RelayOutcome, PipelineError> {
        // Reject a bad target before spending a transcription on it.
        validate_webhook_url(webhook_url)?;

        let transcription = self.stt.transcribe(audio, filename).await?;
        tracing::info!(
            session = %session,
            preview = %preview(&transcription.text),
            "transcribed audio"
        );

        self.relay_text(session, &transcription.text, webhook_url)
            .await
    }

    /// Relays `text` to the webhook, stores the normalized reply and
    /// schedules its synthesis.
    pub async fn relay_text(
        &self,
        session: &SessionId,
        text: &str,
        webhook_url: &str,
    ) -> Result<RelayOutcome, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "text to relay must not be empty".to_string(),
            ));
        }

        let reply = self.webhook.relay(webhook_url, text).await?;
        tracing::info!(session = %session, preview = %preview(&reply.text), "received webhook reply");
        if !self.sessions.set_reply(session, reply.clone()) {
            tracing::warn!(session = %session, "session evicted during relay, skipping synthesis");
        } else if reply.text.trim().is_empty() {
            tracing::warn!(session = %session, "webhook reply is empty, skipping synthesis");
        } else {
            self.schedule_synthesis(session.clone(), reply.clone());
        }

        Ok(RelayOutcome {
            text: text.to_string(),
            reply,
        })
    }

    /// Stores `text` as the session's reply and synthesizes it inline.
    pub async fn speak(
        &self,
        session: &SessionId,
        text: &str,
        options: &VoiceOptions,
    ) -> Result<SpokenReply, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "text to speak must not be empty".to_string(),
            ));
        }

        if !self.sessions.set_reply(session, Reply::new(text)) {
            return Err(session_gone());
        }
        let artifact = self.tts.synthesize(text, options).await?;
        let update = self.sessions.set_artifact(session, artifact.clone(), text);
        let artifact = self.settle(session, artifact, update).await?;

        Ok(SpokenReply {
            text: text.to_string(),
            audio_url: audio_url(&artifact),
        })
    }

    /// Accepts a reply pushed by an external workflow for `session`.
    pub async fn push_reply(
        &self,
        session: &SessionId,
        text: &str,
    ) -> Result<SpokenReply, PipelineError> {
        tracing::info!(session = %session, preview = %preview(text), "received pushed reply");
        self.speak(session, text, &VoiceOptions::default()).await
    }

    /// Returns the session's last reply.
    pub fn reply(&self, session: &SessionId) -> Result<Reply, PipelineError> {
        self.sessions
            .get_reply(session)
            .ok_or_else(|| PipelineError::NotFound("no reply available".to_string()))
    }

    /// Returns the last reply with its audio URL.
    ///
    /// When no artifact matches the reply, or its file has vanished, the
    /// reply is synthesized inline.
    pub async fn reply_audio(&self, session: &SessionId) -> Result<SpokenReply, PipelineError> {
        let reply = self.reply(session)?;

        if let Some(artifact) = self.sessions.get_current_artifact(session) {
            if self.artifacts.exists(&artifact).await {
                return Ok(SpokenReply {
                    text: reply.text,
                    audio_url: audio_url(&artifact),
                });
            }
            tracing::warn!(
                session = %session,
                filename = artifact.filename(),
                "recorded artifact is missing, synthesizing again"
            );
            self.sessions.discard_artifact(session, &artifact);
        }

        let artifact = self
            .tts
            .synthesize(&reply.text, &VoiceOptions::default())
            .await?;
        // A background task may have stored audio for this reply meanwhile;
        // the first one recorded is the one served.
        let update = self
            .sessions
            .set_artifact_if_current(session, artifact.clone(), &reply.text);
        let artifact = self.settle(session, artifact, update).await?;

        Ok(SpokenReply {
            text: reply.text,
            audio_url: audio_url(&artifact),
        })
    }

    /// Resolves `filename` to the session's current artifact.
    ///
    /// Any name other than the one currently recorded for the session is
    /// forbidden, which also rules out path traversal.
    pub async fn audio_artifact(
        &self,
        session: &SessionId,
        filename: &str,
    ) -> Result<ArtifactRef, PipelineError> {
        let artifact = self
            .sessions
            .get_artifact(session)
            .ok_or_else(|| PipelineError::NotFound("no audio available".to_string()))?;

        if artifact.filename() != filename {
            tracing::warn!(session = %session, requested = filename, "audio filename mismatch");
            return Err(PipelineError::Forbidden(
                "audio file does not belong to this session".to_string(),
            ));
        }

        if !self.artifacts.exists(&artifact).await {
            return Err(PipelineError::NotFound("audio file is gone".to_string()));
        }

        Ok(artifact)
    }

    /// Synthesizes `reply` on a detached task.
    ///
    /// The returned handle may be dropped; the task runs to completion
    /// either way.
    pub fn schedule_synthesis(&self, session: SessionId, reply: Reply) -> JoinHandle<()> {
        let tts = self.tts.clone();
        let sessions = self.sessions.clone();
        let artifacts = self.artifacts.clone();

        tokio::spawn(async move {
            let artifact = match tts.synthesize(&reply.text, &VoiceOptions::default()).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::warn!(session = %session, "background synthesis failed: {}", e);
                    return;
                }
            };

            match sessions.set_artifact_if_current(&session, artifact, &reply.text) {
                ArtifactUpdate::Stored { superseded } => {
                    tracing::info!(session = %session, "background synthesis stored");
                    if let Some(old) = superseded {
                        artifacts.release(&old).await;
                    }
                }
                ArtifactUpdate::Kept { discarded, .. } => {
                    tracing::debug!(
                        session = %session,
                        "reply already has audio, discarding background result"
                    );
                    artifacts.release(&discarded).await;
                }
                ArtifactUpdate::Stale(artifact) => {
                    tracing::info!(
                        session = %session,
                        "reply changed during background synthesis, discarding audio"
                    );
                    artifacts.release(&artifact).await;
                }
            }
        })
    }

    /// Releases whatever `update` left unreferenced and returns the artifact
    /// the session now serves for the reply. `synthesized` is the artifact
    /// the update was made with.
    async fn settle(
        &self,
        session: &SessionId,
        synthesized: ArtifactRef,
        update: ArtifactUpdate,
    ) -> Result<ArtifactRef, PipelineError> {
        match update {
            ArtifactUpdate::Stored { superseded } => {
                if let Some(old) = superseded {
                    self.artifacts.release(&old).await;
                }
                Ok(synthesized)
            }
            ArtifactUpdate::Kept { existing, discarded } => {
                self.artifacts.release(&discarded).await;
                Ok(existing)
            }
            ArtifactUpdate::Stale(artifact) => {
                self.artifacts.release(&artifact).await;
                tracing::info!(session = %session, "reply changed during synthesis, discarding audio");
                Err(PipelineError::NotFound(
                    "reply changed or session expired during synthesis".to_string(),
                ))
            }
        }
    }
}

fn session_gone() -> PipelineError {
    PipelineError::NotFound("session expired".to_string())
}

/// First few characters of `text`, for logs.
fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 50;
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}
