use crate::config::OllamaConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A text-generation service. Used both for answers and for rerank judgments.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Non-streaming client for Ollama's `/api/chat`. One request per call, no retries.
pub struct OllamaChatClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaChatClient {
    pub const SERVICE: &'static str = "ollama-chat";

    pub fn new(config: &OllamaConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.chat_timeout_secs))
            .build()?;
        let endpoint = url::Url::parse(&format!("{}/api/chat", config.normalized_base_url()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: config.chat_model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                PipelineError::unavailable(
                    Self::SERVICE,
                    None,
                    format!("failed to reach {}: {error}", self.endpoint),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::unavailable(
                Self::SERVICE,
                Some(status.as_u16()),
                body,
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| PipelineError::unavailable(Self::SERVICE, None, error.to_string()))?;

        parsed
            .message
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                PipelineError::unavailable(
                    Self::SERVICE,
                    Some(status.as_u16()),
                    "chat response missing message content",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_matches_ollama_shape() {
        let request = ChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            stream: false,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "llama3.2",
                "messages": [{"role": "user", "content": "hello"}],
                "stream": false,
            })
        );
    }

    #[test]
    fn chat_response_without_message_parses_to_none() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(parsed.message.is_none());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": "hi"}}"#)
                .unwrap();
        assert_eq!(parsed.message.and_then(|message| message.content).as_deref(), Some("hi"));
    }

    #[test]
    fn client_uses_configured_model() {
        let client = OllamaChatClient::new(&OllamaConfig::default()).unwrap();
        assert_eq!(client.model(), "llama3.2");
        assert_eq!(client.endpoint, "http://127.0.0.1:11434/api/chat");
    }
}
