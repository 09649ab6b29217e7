//! Chat completion provider trait and the OpenAI-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// The default OpenAI chat completions API endpoint.
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// The default chat model.
const DEFAULT_MODEL: &str = "gpt-4o";

/// A provider that generates a text completion from a system persona
/// and a user prompt.
///
/// One call is one billed network round-trip; orchestration (prompt
/// assembly, response parsing) lives outside the provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate a completion for the given messages.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

/// A [`ChatProvider`] backed by the OpenAI chat completions API.
///
/// # Example
///
/// ```rust,ignore
/// use dreamlens_rag::generation::OpenAiChatModel;
///
/// let chat = OpenAiChatModel::from_env()?;
/// let text = chat.complete("당신은 해몽 전문가입니다.", prompt, 0.7).await?;
/// ```
#[derive(Debug)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    /// Create a new chat model with the given API key and a 30 s
    /// request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, Duration::from_secs(30))
    }

    /// Create a new chat model with an explicit per-request timeout.
    /// Timeout expiry surfaces as [`RagError::Provider`].
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Provider {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;

        Ok(Self { client, api_key, model: DEFAULT_MODEL.into() })
    }

    /// Create a chat model governed by a [`RagConfig`]: its
    /// `request_timeout_secs` replaces the constructor default.
    /// (Temperature is passed per call by the pipeline.)
    pub fn from_config(api_key: impl Into<String>, config: &RagConfig) -> Result<Self> {
        Self::with_timeout(api_key, config.request_timeout())
    }

    /// Create a new chat model using the `OPENAI_API_KEY` environment
    /// variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Provider {
            provider: "OpenAI".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `gpt-4o-mini`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── ChatProvider implementation ────────────────────────────────────

#[async_trait]
impl ChatProvider for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        debug!(
            provider = "OpenAI",
            model = %self.model,
            prompt_len = user.len(),
            temperature,
            "requesting chat completion"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature,
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "chat request failed");
                RagError::Provider {
                    provider: "OpenAI".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = "OpenAI", %status, "chat API error");
            return Err(RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse chat response");
            RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::Provider {
                provider: "OpenAI".into(),
                message: "API returned no choices".into(),
            })
    }
}
