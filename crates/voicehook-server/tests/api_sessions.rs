mod common;

use axum::http::{header, StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn fresh_session_gets_cookie_and_no_reply() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;

    let response = app.send(get("/api/reply", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("session_id="));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn existing_cookie_is_kept() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;

    let response = app
        .send(get("/api/reply", Some("session_id=caller-42")))
        .await;

    assert_eq!(session_cookie(&response), "session_id=caller-42");
}

#[tokio::test]
async fn malformed_cookie_is_replaced() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let oversized = format!("session_id={}", "a".repeat(200));

    let response = app.send(get("/api/reply", Some(&oversized))).await;

    let cookie = session_cookie(&response);
    assert_ne!(cookie, oversized);
    assert!(cookie.len() < 100);
}

#[tokio::test]
async fn custom_cookie_name_is_honored() {
    let app = setup_with(SttBehavior::Transcript(TRANSCRIPT), |config| {
        config.sessions.cookie_name = "vh_sid".to_string();
    })
    .await;

    let response = app
        .send(post_json("/api/speak", Some("vh_sid=abc"), json!({ "text": "hej" })))
        .await;
    assert_eq!(session_cookie(&response), "vh_sid=abc");

    let response = app.send(get("/api/reply", Some("vh_sid=abc"))).await;
    assert_eq!(json_body(response).await["text"], "hej");
}

#[tokio::test]
async fn sessions_are_isolated() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;

    let alice = app
        .send(post_json("/api/speak", None, json!({ "text": "dla Alicji" })))
        .await;
    let alice_cookie = session_cookie(&alice);
    let alice_url = json_body(alice).await["audioUrl"].as_str().unwrap().to_string();

    let bob = app
        .send(post_json("/api/speak", None, json!({ "text": "dla Boba" })))
        .await;
    let bob_cookie = session_cookie(&bob);
    assert_ne!(alice_cookie, bob_cookie);

    let response = app.send(get("/api/reply", Some(&alice_cookie))).await;
    assert_eq!(json_body(response).await["text"], "dla Alicji");
    let response = app.send(get("/api/reply", Some(&bob_cookie))).await;
    assert_eq!(json_body(response).await["text"], "dla Boba");

    // Bob cannot fetch Alice's audio.
    let response = app.send(get(&alice_url, Some(&bob_cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn audio_without_artifact_is_not_found() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;

    let response = app
        .send(get("/api/audio/tts_0000.mp3", Some("session_id=nobody")))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audio_with_wrong_name_is_forbidden() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let response = app
        .send(post_json("/api/speak", None, json!({ "text": "tajne" })))
        .await;
    let cookie = session_cookie(&response);

    let response = app
        .send(get("/api/audio/..%2Fconfig.toml", Some(&cookie)))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn relay_reply_cannot_target_another_session() {
    let app = setup(SttBehavior::Transcript(TRANSCRIPT)).await;
    let victim = app
        .send(post_json("/api/speak", None, json!({ "text": "moje zamówienie" })))
        .await;
    let victim_cookie = session_cookie(&victim);
    let victim_id = session_id(&victim_cookie);
    let victim_url = json_body(victim).await["audioUrl"].as_str().unwrap().to_string();

    let response = app
        .send(post_json(
            "/api/relay-reply",
            Some("session_id=intruder"),
            json!({ "text": "przejęte", "sessionId": victim_id.as_str() }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(session_cookie(&response), "session_id=intruder");

    let response = app.send(get("/api/reply", Some(&victim_cookie))).await;
    assert_eq!(json_body(response).await["text"], "moje zamówienie");
    let response = app.send(get(&victim_url, Some(&victim_cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get("/api/reply", Some("session_id=intruder"))).await;
    assert_eq!(json_body(response).await["text"], "przejęte");
}

#[tokio::test]
async fn overflow_evicts_oldest_session_and_its_audio() {
    let app = setup_with(SttBehavior::Transcript(TRANSCRIPT), |config| {
        config.sessions.max_sessions = 2;
    })
    .await;

    let first = app
        .send(post_json("/api/speak", Some("session_id=first"), json!({ "text": "1" })))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    app.send(post_json("/api/speak", Some("session_id=second"), json!({ "text": "2" })))
        .await;
    app.send(post_json("/api/speak", Some("session_id=third"), json!({ "text": "3" })))
        .await;

    let sessions = app.state.orchestrator.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(!sessions.contains(&session_id("session_id=first")));
    assert_eq!(app.artifact_files().len(), 2);

    // The evicted caller starts over.
    let response = app.send(get("/api/reply", Some("session_id=first"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
