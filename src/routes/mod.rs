pub mod auth_routes;
pub mod chat_routes;
pub mod chatbot_routes;
pub mod public_routes;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    http::Method,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_user;
use crate::domain::require_embed_domain;
use crate::error::AppError;
use crate::state::SharedState;
use crate::validation::schemas::{
    ChatMessage, ChatbotIdParams, CreateChatbot, DomainEntry, Pagination, UpdateChatbot,
    VectorQuery,
};
use crate::validation::{enforce, sanitize_request, Rules};

/// Most files accepted in one multipart request.
pub const MAX_FILES_PER_REQUEST: usize = 10;

/// Success envelope: `{ success: true, data?, message? }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

pub fn app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.config.upload.max_file_size * MAX_FILES_PER_REQUEST + 1024 * 1024;

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/auth", auth_router(state.clone()))
        .nest("/api/chatbots", chatbot_router(state.clone()))
        .nest("/api/public", public_router(state))
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn with_id() -> Rules {
    Rules::new().params::<ChatbotIdParams>()
}

/// Authenticated chatbot management. Order per request: sanitize, verify
/// the user, validate, handle.
fn chatbot_router(state: SharedState) -> Router {
    let id = || from_fn_with_state(with_id(), enforce);

    Router::new()
        .route(
            "/all",
            get(chatbot_routes::list_chatbots
                .layer(from_fn_with_state(Rules::new().query::<Pagination>(), enforce))),
        )
        .route(
            "/",
            post(chatbot_routes::create_chatbot
                .layer(from_fn_with_state(Rules::new().body::<CreateChatbot>(), enforce))),
        )
        .route(
            "/with-documents",
            post(chatbot_routes::create_chatbot_with_documents),
        )
        .route(
            "/{chatbotId}",
            get(chatbot_routes::get_chatbot.layer(id()))
                .put(chatbot_routes::update_chatbot.layer(from_fn_with_state(
                    with_id().body::<UpdateChatbot>(),
                    enforce,
                )))
                .delete(chatbot_routes::delete_chatbot.layer(id())),
        )
        .route(
            "/{chatbotId}/documents",
            post(chatbot_routes::upload_documents.layer(id())),
        )
        .route(
            "/{chatbotId}/domains",
            post(chatbot_routes::add_domain.layer(from_fn_with_state(
                with_id().body::<DomainEntry>(),
                enforce,
            )))
            .delete(chatbot_routes::remove_domain.layer(from_fn_with_state(
                with_id().body::<DomainEntry>(),
                enforce,
            ))),
        )
        .route(
            "/{chatbotId}/vectors/status",
            get(chatbot_routes::vector_status.layer(id())),
        )
        .route(
            "/{chatbotId}/vectors/query",
            post(chatbot_routes::vector_query.layer(from_fn_with_state(
                with_id().body::<VectorQuery>(),
                enforce,
            ))),
        )
        .route(
            "/{chatbotId}/chat",
            post(chat_routes::chat.layer(from_fn_with_state(
                with_id().body::<ChatMessage>(),
                enforce,
            ))),
        )
        .route(
            "/{chatbotId}/history",
            get(chat_routes::get_history.layer(id()))
                .delete(chat_routes::clear_history.layer(id())),
        )
        .route_layer(from_fn_with_state(state.clone(), require_user))
        .layer(from_fn(sanitize_request))
        .with_state(state)
}

/// Embedded-widget endpoints. Chatbot routes pass the domain gate before
/// validation; session routes authenticate with a session token instead.
fn public_router(state: SharedState) -> Router {
    let gated = Router::new()
        .route(
            "/chatbots/{chatbotId}",
            get(public_routes::get_chatbot.layer(from_fn_with_state(with_id(), enforce))),
        )
        .route("/embed/{embedKey}", get(public_routes::get_chatbot))
        .route(
            "/chatbots/{chatbotId}/session",
            post(public_routes::create_session.layer(from_fn_with_state(with_id(), enforce))),
        )
        .route(
            "/chatbots/{chatbotId}/chat",
            post(public_routes::chat.layer(from_fn_with_state(
                with_id().body::<ChatMessage>(),
                enforce,
            ))),
        )
        .route(
            "/chatbots/{chatbotId}/history",
            get(public_routes::get_history.layer(from_fn_with_state(with_id(), enforce))),
        )
        .route_layer(from_fn_with_state(state.clone(), require_embed_domain));

    let sessions = Router::new()
        .route(
            "/session/chat",
            post(public_routes::session_chat.layer(from_fn_with_state(
                Rules::new().body::<ChatMessage>(),
                enforce,
            ))),
        )
        .route("/session/history", get(public_routes::session_history));

    gated
        .merge(sessions)
        .layer(from_fn(sanitize_request))
        .with_state(state)
}

/// Pass-through to the auth service. Not sanitized: bodies are relayed
/// byte for byte.
fn auth_router(state: SharedState) -> Router {
    Router::new()
        .route("/signup", post(auth_routes::forward))
        .route("/login", post(auth_routes::forward))
        .route("/", get(auth_routes::forward))
        .route("/approve", post(auth_routes::forward))
        .route("/all", get(auth_routes::forward))
        .route("/refreshSession", get(auth_routes::forward))
        .route("/{userId}", get(auth_routes::forward))
        .route("/google/login", get(auth_routes::forward))
        .route("/google/callback", get(auth_routes::forward))
        .route("/google/token", post(auth_routes::forward))
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "Botdesk chatbot service with auth proxy"
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "botdesk"
    }))
}

async fn fallback_handler() -> AppError {
    AppError::NotFound("Route not found".into())
}
