//! LLM completion client for the hint assistant.
//!
//! The core shapes the message array and hands it off; retry, backoff, and
//! rate-limiting are the chat UI's concern and deliberately absent here.

use crate::{PrepmateError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request timeout for completion calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

/// System prompt for the interview hint assistant.
pub const HINT_SYSTEM_PROMPT: &str = "You are a coding-interview tutor. Guide the user toward the \
solution with hints and questions; do not hand over complete solutions unless explicitly asked. \
Keep answers short and concrete.";

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Opaque completion collaborator.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete a shaped message sequence into assistant text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

// ─── Chat Completions API types ──────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ─── Client ──────────────────────────────────────────────────────────

/// Chat Completions client for the hint assistant.
pub struct HintClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HintClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("prepmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = Self::extract_error_detail(&body);
        if detail.is_empty() {
            Err(PrepmateError::Llm(format!("API error {status}")))
        } else {
            Err(PrepmateError::Llm(format!("API error {status}: {detail}")))
        }
    }

    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
        trimmed.to_string()
    }

    fn map_reqwest_error(e: reqwest::Error) -> PrepmateError {
        if e.is_timeout() {
            PrepmateError::Llm(format!("timeout: {e}"))
        } else if e.is_connect() {
            PrepmateError::Llm(format!("network: {e}"))
        } else {
            PrepmateError::Llm(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for HintClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("completion request with {} message(s)", messages.len());

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .json(&request)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PrepmateError::Llm(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PrepmateError::Llm("empty completion response".to_string()))
    }
}
