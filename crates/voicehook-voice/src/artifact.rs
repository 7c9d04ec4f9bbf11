//! Temporary audio artifacts on local disk.
//!
//! Every artifact gets a collision-free name (`<prefix>_<uuid><ext>`) inside a
//! single directory owned by the process. Releasing is idempotent and never
//! fails the caller; write failures surface as [`StorageError`].

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use voicehook_types::{ArtifactKind, ArtifactRef};

/// Longest file extension carried over from a client-supplied filename.
const MAX_EXTENSION_LEN: usize = 8;

/// Extension used for synthesized speech.
const SPEECH_EXTENSION: &str = "mp3";

/// Extension used for uploads whose filename carries no usable one.
const FALLBACK_UPLOAD_EXTENSION: &str = "webm";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to prepare artifact directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write artifact {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates, checks and deletes artifacts in one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Directory {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` to a freshly named artifact.
    ///
    /// `hint` is a client filename; only a sanitized extension survives.
    pub async fn create(
        &self,
        bytes: &[u8],
        kind: ArtifactKind,
        hint: Option<&str>,
    ) -> Result<ArtifactRef, StorageError> {
        let extension = match kind {
            ArtifactKind::Speech => SPEECH_EXTENSION.to_string(),
            ArtifactKind::Upload => hint
                .and_then(sanitized_extension)
                .unwrap_or_else(|| FALLBACK_UPLOAD_EXTENSION.to_string()),
        };
        let filename = format!("{}_{}.{}", kind.prefix(), Uuid::new_v4().simple(), extension);
        let artifact = ArtifactRef::new(&self.dir, filename);

        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(artifact.path())
                .await?;
            file.write_all(bytes).await?;
            file.flush().await
        };

        if let Err(source) = write.await {
            // A partially written file must not linger.
            let _ = tokio::fs::remove_file(artifact.path()).await;
            return Err(StorageError::Write {
                path: artifact.path().to_path_buf(),
                source,
            });
        }

        tracing::debug!(
            filename = artifact.filename(),
            bytes = bytes.len(),
            "created artifact"
        );
        Ok(artifact)
    }

    /// Deletes the artifact. A missing file only produces a warning.
    pub async fn release(&self, artifact: &ArtifactRef) {
        match tokio::fs::remove_file(artifact.path()).await {
            Ok(()) => tracing::debug!(filename = artifact.filename(), "released artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    filename = artifact.filename(),
                    "artifact already gone at release"
                );
            }
            Err(e) => {
                tracing::warn!(
                    filename = artifact.filename(),
                    "failed to release artifact: {}",
                    e
                );
            }
        }
    }

    /// Returns whether the artifact's backing file is still present.
    pub async fn exists(&self, artifact: &ArtifactRef) -> bool {
        tokio::fs::try_exists(artifact.path()).await.unwrap_or(false)
    }

    /// Stages `bytes` as an artifact for the duration of `f`.
    ///
    /// The artifact is released on every exit path: after `f` resolves
    /// (successfully or not), and also when the returned future is dropped
    /// before completion.
    pub async fn with_scoped<F, Fut, T, E>(
        &self,
        bytes: &[u8],
        kind: ArtifactKind,
        hint: Option<&str>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ArtifactRef) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StorageError>,
    {
        let artifact = self.create(bytes, kind, hint).await?;
        let mut guard = ScopedArtifact(Some(artifact.clone()));

        let result = f(artifact).await;

        if let Some(artifact) = guard.0.take() {
            self.release(&artifact).await;
        }
        result
    }

    /// Deletes artifacts left behind by an earlier process.
    ///
    /// Only files carrying one of the artifact prefixes are touched.
    pub async fn purge(&self) -> Result<usize, StorageError> {
        self.sweep(&HashSet::new(), Duration::ZERO).await
    }

    /// Deletes owned artifacts that are not named in `keep` and were last
    /// modified at least `min_age` ago.
    ///
    /// `min_age` protects files that are still being written or uploaded.
    pub async fn sweep(
        &self,
        keep: &HashSet<String>,
        min_age: Duration,
    ) -> Result<usize, StorageError> {
        let dir_error = |source: io::Error| StorageError::Directory {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(dir_error)?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_owned(name) || keep.contains(name) {
                continue;
            }
            if !min_age.is_zero() && !older_than(&entry, min_age).await {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(file = name, "failed to remove stale artifact: {}", e),
            }
        }
        Ok(removed)
    }
}

fn is_owned(name: &str) -> bool {
    [ArtifactKind::Upload, ArtifactKind::Speech]
        .iter()
        .any(|kind| name.starts_with(&format!("{}_", kind.prefix())))
}

async fn older_than(entry: &tokio::fs::DirEntry, min_age: Duration) -> bool {
    let modified = match entry.metadata().await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= min_age)
        .unwrap_or(false)
}

/// Deletes the staged file if the scope is abandoned mid-flight.
struct ScopedArtifact(Option<ArtifactRef>);

impl Drop for ScopedArtifact {
    fn drop(&mut self) {
        if let Some(artifact) = self.0.take() {
            // Drop cannot await; this path only runs on cancellation.
            if let Err(e) = std::fs::remove_file(artifact.path()) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        filename = artifact.filename(),
                        "failed to release abandoned artifact: {}",
                        e
                    );
                }
            }
        }
    }
}

/// Extracts a lowercase alphanumeric extension from a client filename.
fn sanitized_extension(hint: &str) -> Option<String> {
    let extension = Path::new(hint).extension()?.to_str()?;
    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
