//! Retrieval-augmented chat over a chatbot's stored history.

use std::sync::Arc;

use serde::Serialize;

use crate::chatbot::{Chatbot, ChatbotStore, Role, StoredMessage};
use crate::error::AppError;
use crate::providers::{ChatMessage, Provider};
use crate::rag::{self, VectorClient, CHAT_CONTEXT_TOP_K};

/// System prompt used when a chatbot's own prompt is blank.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context \
     to answer questions accurately. If the context doesn't contain the answer, say so.";
pub const NO_CONTEXT: &str = "No additional context available.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub has_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub timestamp: String,
}

/// Chat orchestration. The provider is injected so tests can swap in a stub.
#[derive(Clone)]
pub struct ChatService {
    provider: Arc<dyn Provider>,
    vectors: VectorClient,
}

impl ChatService {
    pub fn new(provider: Arc<dyn Provider>, vectors: VectorClient) -> Self {
        Self { provider, vectors }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Answer `message` for `chatbot`, then append both turns to its history.
    pub async fn chat(
        &self,
        store: &ChatbotStore,
        chatbot: &Chatbot,
        message: &str,
        user_id: Option<&str>,
    ) -> Result<ChatReply, AppError> {
        let history = store.history(&chatbot.id)?;

        let results = self
            .vectors
            .query(&chatbot.id, message, CHAT_CONTEXT_TOP_K, None)
            .await;
        let context = rag::format_context(&results);
        tracing::debug!(
            chatbot_id = %chatbot.id,
            passages = results.len(),
            context_len = context.len(),
            "retrieved chat context"
        );

        let prompt = build_prompt(chatbot, &context, &history, message);
        let response = self.provider.chat_with_history(&prompt).await.map_err(|e| {
            AppError::Internal(e.context(format!("Chat failed for chatbot {}", chatbot.id)))
        })?;

        let has_context = !context.is_empty();
        let mut user_turn = StoredMessage::new(Role::User, message);
        if let Some(uid) = user_id {
            user_turn = user_turn.with_metadata(serde_json::json!({ "userId": uid }));
        }
        let assistant_turn = StoredMessage::new(Role::Assistant, response.clone()).with_metadata(
            serde_json::json!({
                "hasContext": has_context,
                "contextLength": context.len(),
            }),
        );
        let timestamp = assistant_turn.timestamp.clone();
        store.append_messages(&chatbot.id, &[user_turn, assistant_turn])?;

        tracing::info!(
            chatbot_id = %chatbot.id,
            provider = self.provider.name(),
            model = self.provider.model(),
            has_context,
            "chat turn completed"
        );

        Ok(ChatReply {
            response,
            has_context,
            context: has_context.then_some(context),
            timestamp,
        })
    }

    pub fn history(&self, store: &ChatbotStore, chatbot_id: &str) -> Result<Vec<StoredMessage>, AppError> {
        Ok(store.history(chatbot_id)?)
    }

    pub fn clear_history(&self, store: &ChatbotStore, chatbot_id: &str) -> Result<usize, AppError> {
        let removed = store.clear_history(chatbot_id)?;
        tracing::info!(chatbot_id, removed, "chat history cleared");
        Ok(removed)
    }
}

/// System prompt, context block, prior turns, then the new user message.
pub fn build_prompt(
    chatbot: &Chatbot,
    context: &str,
    history: &[StoredMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let system = if chatbot.system_prompt.trim().is_empty() {
        FALLBACK_SYSTEM_PROMPT
    } else {
        chatbot.system_prompt.as_str()
    };
    let context = if context.is_empty() { NO_CONTEXT } else { context };

    let mut prompt = Vec::with_capacity(history.len() + 3);
    prompt.push(ChatMessage::system(system));
    prompt.push(ChatMessage::system(format!("Context:\n{context}")));
    prompt.extend(history.iter().map(|m| ChatMessage {
        role: m.role,
        content: m.content.clone(),
    }));
    prompt.push(ChatMessage::user(message));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(prompt: &str) -> Chatbot {
        Chatbot {
            id: "a".repeat(24),
            user_id: "u".into(),
            name: "n".into(),
            description: "d".into(),
            system_prompt: prompt.into(),
            metadata: None,
            allowed_domains: vec![],
            is_embeddable: false,
            embed_key: "k".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn prompt_order_and_fallbacks() {
        let history = vec![
            StoredMessage::new(Role::User, "first"),
            StoredMessage::new(Role::Assistant, "reply"),
        ];
        let prompt = build_prompt(&bot(""), "", &history, "next");
        assert_eq!(prompt.len(), 5);
        assert_eq!(prompt[0], ChatMessage::system(FALLBACK_SYSTEM_PROMPT));
        assert_eq!(prompt[1].content, format!("Context:\n{NO_CONTEXT}"));
        assert_eq!(prompt[2].role, Role::User);
        assert_eq!(prompt[3].role, Role::Assistant);
        assert_eq!(prompt[4], ChatMessage::user("next"));
    }

    #[test]
    fn prompt_uses_chatbot_prompt_and_context() {
        let prompt = build_prompt(&bot("Be a pirate."), "[Source 1: a]\nx", &[], "hi");
        assert_eq!(prompt[0].content, "Be a pirate.");
        assert_eq!(prompt[1].content, "Context:\n[Source 1: a]\nx");
    }
}
