//! Speech providers and temporary audio storage for voicehook.
//!
//! Provides the STT (speech-to-text) client that turns caller audio into
//! text, the TTS (text-to-speech) client that renders webhook replies as
//! audio, and the artifact store both of them use for short-lived files.
//!
//! Both clients talk to an OpenAI-compatible HTTP API with a bearer
//! credential. Their configuration is immutable after construction; the only
//! per-call knobs are [`VoiceOptions`] passed to [`TtsService::synthesize`].

pub mod artifact;
pub mod config;
pub mod error;
pub mod stt;
pub mod tts;

pub use artifact::{ArtifactStore, StorageError};
pub use config::{
    ProviderConfig, SynthesisSettings, TranscriptionSettings, VoiceOptions, DEFAULT_API_BASE_URL,
};
pub use error::VoiceError;
pub use stt::{SttService, MAX_STT_INPUT_BYTES};
pub use tts::TtsService;
