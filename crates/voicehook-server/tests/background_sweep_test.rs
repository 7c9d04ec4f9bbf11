mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use voicehook_server::background::sweep_orphaned_artifacts;

#[tokio::test]
async fn sweep_removes_only_unreferenced_artifacts() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;

    let response = app
        .send(post_json("/api/speak", None, json!({ "text": "zostaję" })))
        .await;
    let cookie = session_cookie(&response);
    let kept = app
        .state
        .orchestrator
        .sessions()
        .get_artifact(&session_id(&cookie))
        .unwrap();

    std::fs::write(app.artifact_dir().join("tts_orphan.mp3"), b"lost").unwrap();
    std::fs::write(app.artifact_dir().join("notes.txt"), b"not ours").unwrap();

    let removed = sweep_orphaned_artifacts(&app.state.orchestrator, Duration::ZERO).await;

    assert_eq!(removed, 1);
    assert_eq!(
        app.artifact_files(),
        vec!["notes.txt".to_string(), kept.filename().to_string()]
    );
}

#[tokio::test]
async fn startup_purges_leftover_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("artifacts");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("tts_previous-run.mp3"), b"old").unwrap();
    std::fs::write(dir.join("upload_previous-run.webm"), b"old").unwrap();

    let app = setup_with(SttBehavior::Transcript(TRANSCRIPT), |config| {
        config.storage.artifact_dir = dir.clone();
    })
    .await;

    assert!(app.state.orchestrator.artifacts().dir() == dir.as_path());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}
