//! Background tasks for the voicehook server.
//!
//! Includes:
//! - Sweeping artifact files that no session references any more.

use crate::orchestrator::Orchestrator;
use tokio::time::{sleep, Duration};

/// Runs one sweep: deletes owned artifacts that no session references and
/// that are older than `min_age`. Returns how many files were removed.
pub async fn sweep_orphaned_artifacts(orchestrator: &Orchestrator, min_age: Duration) -> usize {
    let keep = orchestrator.sessions().artifact_filenames();
    match orchestrator.artifacts().sweep(&keep, min_age).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(count = removed, "removed orphaned artifacts");
            } else {
                tracing::debug!("no orphaned artifacts to remove");
            }
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to sweep artifact directory");
            0
        }
    }
}

/// Starts the orphaned-artifact sweep.
///
/// This task runs indefinitely. Released artifacts are normally deleted as
/// soon as they are superseded; the sweep catches files whose release was
/// lost, such as a background synthesis that was still running at eviction.
pub async fn start_sweep_task(orchestrator: Orchestrator, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("artifact sweep disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting artifact sweep task");

    loop {
        sleep(interval).await;
        // Anything younger than one interval may still be in flight.
        sweep_orphaned_artifacts(&orchestrator, interval).await;
    }
}
