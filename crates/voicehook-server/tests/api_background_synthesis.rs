mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use std::time::Duration;

fn filename(audio_url: &str) -> String {
    audio_url.strip_prefix("/api/audio/").unwrap().to_string()
}

#[tokio::test]
async fn reply_audio_url_survives_late_background_result() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let webhook = spawn_webhook(StatusCode::OK, json!({ "text": "Gotowe" })).await;
    app.provider.delay_next_speech(Duration::from_millis(400));

    let response = app
        .send(post_json(
            "/api/text-message",
            None,
            json!({ "text": "Status?", "webhook_url": webhook }),
        ))
        .await;
    let cookie = session_cookie(&response);
    // The held request is the background one.
    wait_for(|| app.provider.tts_calls() == 1).await;

    let response = app.send(get("/api/reply/audio", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let audio_url = json_body(response).await["audioUrl"]
        .as_str()
        .unwrap()
        .to_string();

    wait_for(|| app.provider.tts_answered() == 2).await;
    settle().await;

    let audio = app.send(get(&audio_url, Some(&cookie))).await;
    assert_eq!(audio.status(), StatusCode::OK);
    assert_eq!(app.artifact_files(), vec![filename(&audio_url)]);

    let response = app.send(get("/api/reply/audio", Some(&cookie))).await;
    assert_eq!(json_body(response).await["audioUrl"], audio_url.as_str());
    assert_eq!(app.provider.tts_calls(), 2);
}

#[tokio::test]
async fn background_failure_keeps_previous_artifact() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let webhook = spawn_webhook(StatusCode::OK, json!({ "text": "druga odpowiedź" })).await;

    let response = app
        .send(post_json("/api/speak", None, json!({ "text": "pierwsza" })))
        .await;
    let cookie = session_cookie(&response);
    let first_url = json_body(response).await["audioUrl"]
        .as_str()
        .unwrap()
        .to_string();

    app.provider.fail_speech(true);
    let response = app
        .send(post_json(
            "/api/text-message",
            Some(&cookie),
            json!({ "text": "dalej", "webhook_url": webhook }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["webhookReply"], "druga odpowiedź");

    wait_for(|| app.provider.tts_answered() == 2).await;
    settle().await;

    let id = session_id(&cookie);
    let sessions = app.state.orchestrator.sessions();
    assert_eq!(
        sessions.get_artifact(&id).map(|a| a.filename().to_string()),
        Some(filename(&first_url))
    );
    assert_eq!(sessions.get_current_artifact(&id), None);
    let audio = app.send(get(&first_url, Some(&cookie))).await;
    assert_eq!(audio.status(), StatusCode::OK);
    assert_eq!(app.artifact_files(), vec![filename(&first_url)]);

    // On-demand synthesis reports the failure, then recovers.
    let response = app.send(get("/api/reply/audio", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    app.provider.fail_speech(false);
    let response = app.send(get("/api/reply/audio", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "druga odpowiedź");
    let second_url = body["audioUrl"].as_str().unwrap().to_string();
    assert_ne!(second_url, first_url);
    assert_eq!(app.artifact_files(), vec![filename(&second_url)]);
}

#[tokio::test]
async fn stale_background_result_leaves_no_file() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let webhook = spawn_webhook(StatusCode::OK, json!({ "text": "stara" })).await;
    app.provider.delay_next_speech(Duration::from_millis(400));

    let response = app
        .send(post_json(
            "/api/text-message",
            None,
            json!({ "text": "hej", "webhook_url": webhook }),
        ))
        .await;
    let cookie = session_cookie(&response);
    wait_for(|| app.provider.tts_calls() == 1).await;

    // The reply changes while the background request is held.
    let response = app
        .send(post_json("/api/speak", Some(&cookie), json!({ "text": "nowa" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let spoken_url = json_body(response).await["audioUrl"]
        .as_str()
        .unwrap()
        .to_string();

    wait_for(|| app.provider.tts_answered() == 2).await;
    settle().await;

    assert_eq!(app.artifact_files(), vec![filename(&spoken_url)]);
    let response = app.send(get("/api/reply/audio", Some(&cookie))).await;
    let body = json_body(response).await;
    assert_eq!(body["text"], "nowa");
    assert_eq!(body["audioUrl"], spoken_url.as_str());
    assert_eq!(app.provider.tts_calls(), 2);
}
