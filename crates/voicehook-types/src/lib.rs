//! Shared types for the voicehook workspace.
//!
//! Holds the small set of domain values that cross crate boundaries: the
//! opaque session token, the canonical webhook reply, transcription results,
//! and handles to temporary audio artifacts. Nothing in this crate performs
//! I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque, unguessable identifier of a caller's session.
///
/// Tokens minted by [`SessionId::generate`] carry 122 bits of randomness.
/// Tokens supplied by callers are accepted through [`SessionId::parse`],
/// which only admits URL- and cookie-safe characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Maximum accepted length of a caller-supplied token.
    pub const MAX_LEN: usize = 128;

    /// Mints a fresh random session token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accepts a caller-supplied token.
    ///
    /// Returns `None` for empty or oversized tokens and for tokens containing
    /// anything other than ASCII alphanumerics, `-` and `_`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || token.len() > Self::MAX_LEN {
            return None;
        }
        if !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return None;
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of whatever the workflow webhook answered, or of text a
/// caller supplied directly for speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Result of a single speech-to-text call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
}

/// What a temporary artifact holds. Determines its filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Audio uploaded by a caller, held only for the duration of a
    /// transcription request.
    Upload,
    /// Audio produced by the synthesis provider.
    Speech,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Speech => "tts",
        }
    }
}

/// Handle to an audio artifact on the backing store.
///
/// `filename` is the public-facing name used in audio URLs; it is always the
/// final component of `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    path: PathBuf,
    filename: String,
}

impl ArtifactRef {
    /// Builds a reference from a directory and a bare filename.
    pub fn new(dir: &Path, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            path: dir.join(&filename),
            filename,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}
