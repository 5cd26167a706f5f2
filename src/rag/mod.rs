//! Client for the external vector/RAG server.
//!
//! Query and status lookups degrade to "no context" on failure so a chat can
//! still be answered; uploads surface their errors.

use std::time::Duration;

use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RagConfig;

/// Passages fetched for a chat turn.
pub const CHAT_CONTEXT_TOP_K: u32 = 3;

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorResult {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl VectorResult {
    fn source(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

/// `{ success, data }` wrapper the RAG server puts around every reply.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    results: Vec<VectorResult>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    has_vectors: bool,
}

#[derive(Clone)]
pub struct VectorClient {
    base_url: String,
    client: Client,
    query_timeout: Duration,
    status_timeout: Duration,
    upload_timeout: Duration,
}

impl VectorClient {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            status_timeout: Duration::from_secs(config.status_timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        }
    }

    /// Nearest passages for `query`. Any failure yields an empty list.
    pub async fn query(
        &self,
        chatbot_id: &str,
        query: &str,
        top_k: u32,
        filter: Option<&Value>,
    ) -> Vec<VectorResult> {
        match self.try_query(chatbot_id, query, top_k, filter).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(chatbot_id, "Error querying vector store: {e}");
                Vec::new()
            }
        }
    }

    async fn try_query(
        &self,
        chatbot_id: &str,
        query: &str,
        top_k: u32,
        filter: Option<&Value>,
    ) -> anyhow::Result<Vec<VectorResult>> {
        let url = format!("{}/chatbots/{chatbot_id}/vectors/query", self.base_url);
        let body: Envelope<QueryData> = self
            .client
            .post(&url)
            .timeout(self.query_timeout)
            .json(&QueryRequest { query, top_k, filter })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(match body {
            Envelope {
                success: true,
                data: Some(data),
            } => data.results,
            _ => Vec::new(),
        })
    }

    /// Whether the RAG server holds any vectors for the chatbot. Failures
    /// read as `false`.
    pub async fn status(&self, chatbot_id: &str) -> bool {
        match self.try_status(chatbot_id).await {
            Ok(env) => env.success && env.data.is_some_and(|d| d.has_vectors),
            Err(e) => {
                tracing::error!(chatbot_id, "Error checking vector status: {e}");
                false
            }
        }
    }

    async fn try_status(&self, chatbot_id: &str) -> anyhow::Result<Envelope<StatusData>> {
        let url = format!("{}/chatbots/{chatbot_id}/vectors/status", self.base_url);
        Ok(self
            .client
            .get(&url)
            .timeout(self.status_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Forward one document to the RAG server for ingestion and return its
    /// JSON reply.
    pub async fn upload(
        &self,
        chatbot_id: &str,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<Value> {
        let url = format!("{}/chatbots/{chatbot_id}/documents", self.base_url);
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "RAG server rejected {filename} ({status}): {}",
                crate::providers::sanitize_api_error(&body)
            );
        }

        tracing::info!(chatbot_id, filename, "document forwarded to RAG server");
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

/// Render passages as `[Source n: source]` blocks separated by a blank line.
pub fn format_context(results: &[VectorResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Source {}: {}]\n{}", i + 1, r.source(), r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
