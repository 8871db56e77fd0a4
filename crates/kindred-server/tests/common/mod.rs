#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use kindred_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use kindred_generation::{ChatBackend, ChatRequest, GeneratedImage, GenerationError, ImageBackend};
use kindred_server::api_reply::InFlightReplies;
use kindred_server::image_store::ImageStore;
use kindred_server::middleware::RateLimiter;
use kindred_server::{app, AppState};
use kindred_types::RateLimitPolicy;
use kindred_voice::{SpeechError, SpeechSynthesizer, SynthesizedSpeech};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

pub const PERSONA_JSON: &str = r#"{"name":"Mara","gender":"female","voice":"aura-luna-en","description":"Mara restores old sailboats. She laughs easily."}"#;
pub const REPLY_TEXT: &str = "Oh, hi! I was just sanding a mast. How are you?";
/// PNG signature plus the start of an IHDR chunk.
pub const PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUg==";
pub const AUDIO: &[u8] = &[0xFF, 0xFB, 0x90, 0x00];

/// Chat backend returning a fixed persona for JSON requests and a fixed
/// reply otherwise. Replies can be held until released.
#[derive(Default)]
pub struct FakeChat {
    pub requests: Mutex<Vec<ChatRequest>>,
    pub hold_replies: AtomicBool,
    pub reply_started: Notify,
    pub release_reply: Notify,
}

impl FakeChat {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reply_requests(&self) -> Vec<ChatRequest> {
        self.requests().into_iter().filter(|r| !r.json_mode).collect()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError> {
        let json_mode = request.json_mode;
        self.requests.lock().unwrap().push(request);
        if json_mode {
            return Ok(PERSONA_JSON.to_string());
        }
        self.reply_started.notify_one();
        if self.hold_replies.load(Ordering::SeqCst) {
            self.release_reply.notified().await;
        }
        Ok(REPLY_TEXT.to_string())
    }
}

/// Image backend returning `data`. Generation can be held until released.
pub struct FakeImages {
    pub calls: AtomicUsize,
    pub data: Mutex<String>,
    pub hold: AtomicBool,
    pub generate_started: Notify,
    pub release: Notify,
}

impl Default for FakeImages {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            data: Mutex::new(PNG_BASE64.to_string()),
            hold: AtomicBool::new(false),
            generate_started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ImageBackend for FakeImages {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.generate_started.notify_one();
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(GeneratedImage::Base64(self.data.lock().unwrap().clone()))
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub calls: Mutex<Vec<(String, String)>>,
    pub out_of_credits: AtomicBool,
}

impl FakeSpeech {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedSpeech, SpeechError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        if self.out_of_credits.load(Ordering::SeqCst) {
            return Err(SpeechError::Upstream {
                status: 402,
                message: "Insufficient credits".to_string(),
            });
        }
        Ok(SynthesizedSpeech {
            content_type: "audio/mpeg".to_string(),
            audio: AUDIO.to_vec(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub chat: Arc<FakeChat>,
    pub images: Arc<FakeImages>,
    pub speech: Arc<FakeSpeech>,
    pub uploads: TempDir,
    _db_dir: TempDir,
}

pub fn setup() -> TestApp {
    setup_with_policy(RateLimitPolicy::default())
}

pub fn setup_with_policy(policy: RateLimitPolicy) -> TestApp {
    build(policy, false)
}

/// As [`setup`], but anonymous callers are keyed on `X-Forwarded-For`.
pub fn setup_behind_proxy() -> TestApp {
    build(RateLimitPolicy::default(), true)
}

fn build(policy: RateLimitPolicy, trust_forwarded_for: bool) -> TestApp {
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("kindred.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let uploads = tempfile::tempdir().unwrap();
    let chat = Arc::new(FakeChat::default());
    let images = Arc::new(FakeImages::default());
    let speech = Arc::new(FakeSpeech::default());

    let state = AppState {
        pool: pool.clone(),
        rate_limiter: RateLimiter::new(policy),
        trust_forwarded_for,
        chat: chat.clone(),
        images: images.clone(),
        speech: speech.clone(),
        http: reqwest::Client::new(),
        image_store: ImageStore::new(uploads.path(), "http://kindred.test"),
        replies_in_flight: InFlightReplies::default(),
    };

    TestApp {
        router: app(state),
        pool,
        chat,
        images,
        speech,
        uploads,
        _db_dir: db_dir,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap().to_string()
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

pub async fn send(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Registers an account and returns `(account_id, token)`.
pub async fn register(router: &Router, email: &str, name: &str) -> (String, String) {
    let res = send(
        router,
        request(
            Method::POST,
            "/api/accounts",
            None,
            Some(serde_json::json!({ "email": email, "name": name })),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let json = res.json();
    (
        json["accountId"].as_str().unwrap().to_string(),
        json["token"].as_str().unwrap().to_string(),
    )
}

/// Generates a friend for `token` and returns its id.
pub async fn generate_friend(router: &Router, token: &str) -> String {
    let res = send(
        router,
        request(
            Method::POST,
            "/api/generate",
            Some(token),
            Some(serde_json::json!({ "type": "friend" })),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK, "{}", String::from_utf8_lossy(&res.body));
    res.json()["id"].as_str().unwrap().to_string()
}

pub fn reply_body(friend_id: &str, user_message: &str) -> Value {
    serde_json::json!({
        "type": "response",
        "friendId": friend_id,
        "userMessage": user_message,
        "usersName": "Sam",
    })
}
