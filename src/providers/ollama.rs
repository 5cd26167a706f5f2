use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::traits::{ChatMessage, Provider};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama2";

pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

// ─── Request Structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
}

// ─── Response Structures ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

// ─── Implementation ───────────────────────────────────────────────────────────

impl OllamaProvider {
    pub fn new(base_url: Option<&str>, model: Option<&str>, temperature: f64) -> Self {
        Self {
            base_url: base_url
                .filter(|u| !u.is_empty())
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL).to_string(),
            temperature,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat_with_history(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(
            "Ollama request: url={} model={} message_count={}",
            url,
            self.model,
            messages.len()
        );

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        tracing::debug!("Ollama response status: {}", status);

        if !status.is_success() {
            return Err(super::api_error("Ollama", response).await);
        }

        let body = response.bytes().await?;
        let chat_response: ApiChatResponse = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => {
                let raw = String::from_utf8_lossy(&body);
                tracing::error!(
                    "Ollama response deserialization failed: {e}. body_excerpt={}",
                    super::sanitize_api_error(&raw)
                );
                anyhow::bail!("Failed to parse Ollama response: {e}");
            }
        };

        Ok(chat_response.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn trailing_slash_is_trimmed() {
        let p = OllamaProvider::new(Some("http://gpu-box:11434/"), None, 0.7);
        assert_eq!(p.base_url, "http://gpu-box:11434");
        assert_eq!(p.model(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn posts_non_streaming_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "mistral",
                "stream": false,
                "options": {"temperature": 0.7}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "bonjour"},
                "done": true
            })))
            .mount(&server)
            .await;

        let p = OllamaProvider::new(Some(&server.uri()), Some("mistral"), 0.7);
        let reply = p
            .chat("You are a helpful AI assistant.", &[ChatMessage::assistant("earlier")], "salut")
            .await
            .unwrap();
        assert_eq!(reply, "bonjour");
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let p = OllamaProvider::new(Some(&server.uri()), None, 0.7);
        let err = p.chat_with_history(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse Ollama response"));
    }
}
