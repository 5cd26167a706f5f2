use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::{json, Value};

use super::ApiResponse;
use crate::auth::ChatbotSession;
use crate::chat::ChatReply;
use crate::chatbot::Chatbot;
use crate::domain::GatePass;
use crate::error::AppError;
use crate::state::{AppState, SharedState};
use crate::validation::schemas::ChatMessage;
use crate::validation::Valid;

/// GET /api/public/chatbots/{chatbotId} and GET /api/public/embed/{embedKey}
pub async fn get_chatbot(Extension(GatePass(chatbot)): Extension<GatePass>) -> Json<ApiResponse<Value>> {
    ApiResponse::data(chatbot.public_view())
}

/// POST /api/public/chatbots/{chatbotId}/session
pub async fn create_session(
    State(state): State<SharedState>,
    Extension(GatePass(chatbot)): Extension<GatePass>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let (token, claims) = state.sessions.issue(&chatbot.id)?;
    tracing::info!(chatbot_id = %chatbot.id, session_id = %claims.session_id, "chatbot session issued");
    Ok(ApiResponse::data(json!({
        "token": token,
        "sessionId": claims.session_id,
        "chatbotId": claims.chatbot_id,
        "expiresAt": claims.exp,
    })))
}

/// POST /api/public/chatbots/{chatbotId}/chat
pub async fn chat(
    State(state): State<SharedState>,
    Extension(GatePass(chatbot)): Extension<GatePass>,
    Valid(body): Valid<ChatMessage>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let reply = state
        .chat
        .chat(&state.store, &chatbot, &body.message, body.user_id.as_deref())
        .await?;
    Ok(ApiResponse::data(reply))
}

/// GET /api/public/chatbots/{chatbotId}/history
pub async fn get_history(
    State(state): State<SharedState>,
    Extension(GatePass(chatbot)): Extension<GatePass>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    history_response(&state, &chatbot)
}

/// The chatbot a session token was issued for, if it is still embeddable.
fn session_chatbot(state: &AppState, session: &ChatbotSession) -> Result<Chatbot, AppError> {
    let chatbot = state
        .store
        .get(&session.0.chatbot_id)?
        .ok_or_else(|| AppError::NotFound("Chatbot not found".into()))?;
    if !chatbot.is_embeddable {
        return Err(AppError::Forbidden("This chatbot is not embeddable".into()));
    }
    Ok(chatbot)
}

/// POST /api/public/session/chat
pub async fn session_chat(
    State(state): State<SharedState>,
    session: ChatbotSession,
    Valid(body): Valid<ChatMessage>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let chatbot = session_chatbot(&state, &session)?;
    let user_id = body.user_id.as_deref().unwrap_or(&session.0.session_id);
    let reply = state
        .chat
        .chat(&state.store, &chatbot, &body.message, Some(user_id))
        .await?;
    Ok(ApiResponse::data(reply))
}

/// GET /api/public/session/history
pub async fn session_history(
    State(state): State<SharedState>,
    session: ChatbotSession,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let chatbot = session_chatbot(&state, &session)?;
    history_response(&state, &chatbot)
}

fn history_response(state: &AppState, chatbot: &Chatbot) -> Result<Json<ApiResponse<Value>>, AppError> {
    let history = state.chat.history(&state.store, &chatbot.id)?;
    Ok(ApiResponse::data(json!({
        "chatbotId": chatbot.id,
        "totalMessages": history.len(),
        "history": history,
    })))
}
