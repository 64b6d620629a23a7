//! Client for OpenAI-compatible chat completions APIs.
//!
//! Talks to any server exposing `/v1/chat/completions` (Ollama, vLLM,
//! llama.cpp server). Each agent's system framing is sent as the leading
//! `system` message, followed by the context built by the orchestrator.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kallipolis_kernel::{ChatMessage, CompletionRequest, GenerationUnavailable, TextGenerator};

/// Default server: Ollama's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model tag.
pub const DEFAULT_MODEL: &str = "llama3.1:8b-instruct-q8_0";

/// Connection and sampling settings for [`ChatClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatClientConfig {
    /// Server base URL without the `/v1` suffix
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Completion length limit; server default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// HTTP request timeout
    pub request_timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
            request_timeout_secs: 180,
        }
    }
}

/// Chat completions client.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    config: ChatClientConfig,
}

/// Request body for /v1/chat/completions.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Response from /v1/chat/completions.
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Create a client for the configured server.
    pub fn new(config: ChatClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Send one chat completion and return the first choice's text.
    pub async fn chat(&self, system_prompt: &str, context: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(context.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.extend_from_slice(context);

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await
            .context("Failed to send request to chat server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat request failed with status {}: {}", status, body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("No choices in chat response")
    }

    /// Check that the server answers `GET /v1/models`.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, url = %url, "Health check request failed");
                false
            }
        }
    }
}

impl TextGenerator for ChatClient {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<String, GenerationUnavailable> {
        debug!(
            agent = request.agent,
            messages = request.messages.len(),
            model = %self.config.model,
            "Chat completion"
        );
        self.chat(request.system_prompt, request.messages)
            .await
            .map_err(|e| GenerationUnavailable::new(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ChatClient::new(ChatClientConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.completions_url(),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_defaults() {
        let config = ChatClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, "llama3.1:8b-instruct-q8_0");
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.max_tokens.is_none());
    }

    #[test]
    fn test_request_omits_unset_max_tokens() {
        let request = ChatRequest {
            model: "m",
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            temperature: 0.7,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());

        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "Hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_unavailable() {
        // Port 9 (discard) is closed on test machines
        let client = ChatClient::new(ChatClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let messages = [ChatMessage::user("hi")];
        let err = client
            .complete(CompletionRequest {
                agent: "God",
                system_prompt: "",
                messages: &messages,
            })
            .await
            .unwrap_err();
        assert!(!err.reason.is_empty());
        assert!(!client.health_check().await);
    }
}
