use async_trait::async_trait;
use serde::Serialize;

use crate::chatbot::Role;

/// One turn handed to a chat model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Complete a full conversation. The last message is the one to answer.
    async fn chat_with_history(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;

    /// Answer `message` given a system prompt and prior turns.
    async fn chat(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> anyhow::Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(message));
        self.chat_with_history(&messages).await
    }

    /// Short provider identifier for logs.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Warm up the HTTP connection pool.
    /// Default implementation is a no-op; providers with HTTP clients may override.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
