pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use traits::{ChatMessage, Provider};

use crate::config::LlmConfig;

/// Factory: build the configured chat provider.
pub fn create_provider(config: &LlmConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiProvider::new(
            config.api_key.as_deref(),
            config.base_url.as_deref(),
            config.model.as_deref(),
            config.temperature,
        ))),
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            config.base_url.as_deref(),
            config.model.as_deref(),
            config.temperature,
        ))),
        other => anyhow::bail!("Unknown LLM provider: {other}. Use \"openai\" or \"ollama\"."),
    }
}

const MAX_ERROR_EXCERPT: usize = 200;

/// Shorten an upstream error body for logs and error messages.
pub(crate) fn sanitize_api_error(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_ERROR_EXCERPT {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_ERROR_EXCERPT).collect();
    format!("{cut}...")
}

/// Turn a non-success response into an error carrying a body excerpt.
pub(crate) async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt = sanitize_api_error(&body);
    tracing::error!("{provider} error response: status={status} body_excerpt={excerpt}");
    anyhow::anyhow!("{provider} API error ({status}): {excerpt}")
}
