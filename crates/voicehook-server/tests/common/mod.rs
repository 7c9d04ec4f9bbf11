#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voicehook_server::{app, config::Config, AppState};
use voicehook_types::SessionId;

pub const TRANSCRIPT: &str = "Poproszę dużą pizzę";
pub const SPEECH_BYTES: &[u8] = b"ID3\x04\x00fake-mp3-frames";
pub const BOUNDARY: &str = "voicehook-test-boundary";

/// How the simulated speech provider answers transcription requests.
#[derive(Clone, Copy)]
pub enum SttBehavior {
    Transcript(&'static str),
    Fail,
}

/// Runtime switches for the simulated speech endpoint.
#[derive(Default)]
pub struct SpeechControl {
    fail: AtomicBool,
    next_delay_ms: AtomicU64,
    calls: AtomicUsize,
    answered: AtomicUsize,
}

pub struct Provider {
    pub base_url: String,
    pub stt_calls: Arc<AtomicUsize>,
    speech: Arc<SpeechControl>,
}

impl Provider {
    pub fn stt_calls(&self) -> usize {
        self.stt_calls.load(Ordering::SeqCst)
    }

    /// Speech requests received so far.
    pub fn tts_calls(&self) -> usize {
        self.speech.calls.load(Ordering::SeqCst)
    }

    /// Speech requests answered so far, successfully or not.
    pub fn tts_answered(&self) -> usize {
        self.speech.answered.load(Ordering::SeqCst)
    }

    /// Makes every following speech request fail with a 500.
    pub fn fail_speech(&self, fail: bool) {
        self.speech.fail.store(fail, Ordering::SeqCst);
    }

    /// Holds the answer to the next speech request for `delay`.
    pub fn delay_next_speech(&self, delay: Duration) {
        self.speech
            .next_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn spawn_provider(stt: SttBehavior) -> Provider {
    let stt_calls = Arc::new(AtomicUsize::new(0));
    let speech = Arc::new(SpeechControl::default());
    let stt_counter = stt_calls.clone();
    let speech_control = speech.clone();

    let router = Router::new()
        .route(
            "/v1/audio/transcriptions",
            post(move |_body: Bytes| {
                let counter = stt_counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    match stt {
                        SttBehavior::Transcript(text) => Json(json!({ "text": text })).into_response(),
                        SttBehavior::Fail => (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "error": { "message": "model overloaded" } })),
                        )
                            .into_response(),
                    }
                }
            }),
        )
        .route(
            "/v1/audio/speech",
            post(move |Json(_body): Json<Value>| {
                let control = speech_control.clone();
                async move {
                    control.calls.fetch_add(1, Ordering::SeqCst);
                    let delay = control.next_delay_ms.swap(0, Ordering::SeqCst);
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    let response = if control.fail.load(Ordering::SeqCst) {
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "error": { "message": "voice unavailable" } })),
                        )
                            .into_response()
                    } else {
                        ([(header::CONTENT_TYPE, "audio/mpeg")], SPEECH_BYTES).into_response()
                    };
                    control.answered.fetch_add(1, Ordering::SeqCst);
                    response
                }
            }),
        );

    let base = spawn(router).await;
    Provider {
        base_url: format!("{}/v1", base),
        stt_calls,
        speech,
    }
}

/// Spawns a webhook that answers every call with `status` and `body`.
pub async fn spawn_webhook(status: StatusCode, body: Value) -> String {
    let router = Router::new().route(
        "/webhook/voice",
        post(move |Json(_envelope): Json<Value>| {
            let body = body.clone();
            async move { (status, Json(body)) }
        }),
    );
    format!("{}/webhook/voice", spawn(router).await)
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Provider,
    artifact_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

pub async fn setup(stt: SttBehavior) -> TestApp {
    setup_with(stt, |_| {}).await
}

pub async fn setup_with(stt: SttBehavior, customize: impl FnOnce(&mut Config)) -> TestApp {
    let provider = spawn_provider(stt).await;
    let tmp = tempfile::tempdir().unwrap();
    let artifact_dir = tmp.path().join("artifacts");

    let mut config = Config::default();
    config.speech.api_base_url = provider.base_url.clone();
    config.speech.api_key = "sk-test".to_string();
    config.speech.timeout_secs = 5;
    config.webhook.timeout_secs = 5;
    config.storage.artifact_dir = artifact_dir.clone();
    customize(&mut config);
    config.validate().unwrap();

    let state = AppState::from_config(&config).await.unwrap();
    TestApp {
        router: app(state.clone()),
        state,
        provider,
        artifact_dir,
        _tmp: tmp,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn artifact_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.artifact_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_audio(uri: &str, cookie: Option<&str>, audio: &[u8], webhook_url: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"webhook_url\"\r\n\r\n{url}\r\n",
            b = BOUNDARY,
            url = webhook_url
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"recording.webm\"\r\n\
             Content-Type: audio/webm\r\n\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// Returns the `name=value` pair from the response's session cookie.
pub fn session_cookie(response: &Response) -> String {
    let value = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response should set the session cookie")
        .to_str()
        .unwrap();
    value.split(';').next().unwrap().trim().to_string()
}

pub fn session_id(cookie: &str) -> SessionId {
    let (_, value) = cookie.split_once('=').unwrap();
    SessionId::parse(value).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn raw_body(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// Waits for the pipeline to finish with a provider answer that was just
/// sent: writing the file and updating the session.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
