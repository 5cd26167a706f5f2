//! Chatbot entities and their chat history.

pub mod store;

use serde::Serialize;
use serde_json::Value;

pub use store::ChatbotStore;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chatbot {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub allowed_domains: Vec<String>,
    pub is_embeddable: bool,
    pub embed_key: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Chatbot {
    /// The embed policy derived from this entity. Never stored on its own.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            is_embeddable: self.is_embeddable,
            allowed_domains: self.allowed_domains.clone(),
        }
    }

    /// Subset safe to hand to an anonymous embedding page.
    pub fn public_view(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "isEmbeddable": self.is_embeddable,
            "embedKey": self.embed_key,
        })
    }
}

/// Embed policy for one chatbot. If `is_embeddable` is false every embedded
/// request is denied, whatever the whitelist says; an empty whitelist with
/// `is_embeddable` true admits any origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub is_embeddable: bool,
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChatbot {
    pub name: String,
    pub description: String,
    pub system_prompt: Option<String>,
    pub metadata: Option<Value>,
    pub allowed_domains: Vec<String>,
    pub is_embeddable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChatbotPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
    pub metadata: Option<Value>,
    pub allowed_domains: Option<Vec<String>>,
    pub is_embeddable: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StoredMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
