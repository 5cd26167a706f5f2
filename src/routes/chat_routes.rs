use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::chatbot_routes::owned_chatbot;
use super::ApiResponse;
use crate::auth::AuthUser;
use crate::chat::ChatReply;
use crate::error::AppError;
use crate::state::SharedState;
use crate::validation::schemas::{ChatMessage, ChatbotIdParams};
use crate::validation::Valid;

/// POST /api/chatbots/{chatbotId}/chat
pub async fn chat(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    Valid(body): Valid<ChatMessage>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    if body.stream {
        tracing::debug!(chatbot_id = %chatbot.id, "streaming requested; answering in one response");
    }
    let user_id = body.user_id.as_deref().unwrap_or(&user.user_id);
    let reply = state
        .chat
        .chat(&state.store, &chatbot, &body.message, Some(user_id))
        .await?;
    Ok(ApiResponse::data(reply))
}

/// GET /api/chatbots/{chatbotId}/history
pub async fn get_history(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    let history = state.chat.history(&state.store, &chatbot.id)?;
    Ok(ApiResponse::data(json!({
        "chatbotId": chatbot.id,
        "totalMessages": history.len(),
        "history": history,
    })))
}

/// DELETE /api/chatbots/{chatbotId}/history
pub async fn clear_history(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    state.chat.clear_history(&state.store, &chatbot.id)?;
    Ok(ApiResponse::message("Chat history cleared successfully"))
}
