use crate::artifact::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
