//! Shared harness: a migrated temp database, a canned chat model and an
//! HS256 token verifier wired into the real router.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use botdesk::auth::JwtVerifier;
use botdesk::chatbot::{Chatbot, NewChatbot};
use botdesk::config::BotdeskConfig;
use botdesk::db;
use botdesk::providers::traits::{ChatMessage, Provider};
use botdesk::state::{AppState, SharedState};

pub const USER_SECRET: &str = "user-token-secret";
pub const SESSION_SECRET: &str = "session-token-secret";

/// Replies with a fixed string and records every prompt it was given.
#[derive(Default)]
pub struct CannedProvider {
    pub reply: String,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedProvider {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Vec<ChatMessage> {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Provider for CannedProvider {
    async fn chat_with_history(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned-1"
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub router: Router,
    pub provider: Arc<CannedProvider>,
    _dir: TempDir,
}

pub fn config(rag_url: &str, auth_url: &str) -> BotdeskConfig {
    let mut cfg: BotdeskConfig = toml::from_str("").unwrap();
    cfg.rag.server_url = rag_url.into();
    cfg.rag.query_timeout_secs = 2;
    cfg.rag.status_timeout_secs = 2;
    cfg.auth.service_url = auth_url.into();
    cfg.auth.session_secret = Some(SESSION_SECRET.into());
    cfg
}

impl TestApp {
    /// RAG and auth URLs default to an unroutable port so calls fail fast.
    pub fn new() -> Self {
        Self::with_services("http://127.0.0.1:9", "http://127.0.0.1:9")
    }

    pub fn with_services(rag_url: &str, auth_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("botdesk.db");
        let pool = db::open(&db_path, 2).unwrap();

        let provider = CannedProvider::new("Hello from the bot");
        let state = AppState::new(
            config(rag_url, auth_url),
            Arc::new(pool),
            provider.clone(),
            JwtVerifier::hs256(USER_SECRET),
        );
        let router = botdesk::routes::app(state.clone());
        Self {
            state,
            router,
            provider,
            _dir: dir,
        }
    }

    pub fn seed_chatbot(&self, owner: &str, embeddable: bool, domains: &[&str]) -> Chatbot {
        self.state
            .store
            .create(
                owner,
                NewChatbot {
                    name: "Support".into(),
                    description: "Answers support questions".into(),
                    allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
                    is_embeddable: embeddable,
                    ..NewChatbot::default()
                },
            )
            .unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        split(resp).await
    }
}

pub async fn split(resp: Response<Body>) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

/// A user token as the auth service would mint it.
pub fn user_token(user_id: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "userId": user_id, "email": format!("{user_id}@example.com"), "exp": exp }),
        &EncodingKey::from_secret(USER_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
