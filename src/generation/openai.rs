//! OpenAI-compatible Chat Completions provider
//!
//! Works against api.openai.com and any server speaking the same wire format
//! (vLLM, llama.cpp server, Ollama's `/v1`). Prior exchanges are replayed as
//! alternating user/assistant messages.

use super::{GenerationClient, SamplingConfig};
use crate::memory::ExchangeRecord;
use crate::{HalcyonError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_DETAIL_CHARS: usize = 300;

// ─── Chat Completions API types ─────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    /// Not part of the OpenAI schema; honoured by vLLM and llama.cpp
    repetition_penalty: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Failure of a single attempt
#[derive(Debug)]
struct AttemptError {
    message: String,
    retryable: bool,
}

impl AttemptError {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

// ─── Client ─────────────────────────────────────────────────────────

/// Provider that calls `{base_url}/chat/completions`
pub struct ChatCompletionsClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("halcyon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HalcyonError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!("Chat completions provider: model={}, base_url={}", model, base_url);

        Ok(Self {
            client,
            base_url,
            model,
            api_key: None,
            system_prompt: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    fn build_messages(&self, prompt: &str, context: &[ExchangeRecord]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.len() * 2 + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::new("system", system));
        }
        for exchange in context {
            messages.push(ChatMessage::new("user", &exchange.user_text));
            messages.push(ChatMessage::new("assistant", &exchange.ai_text));
        }
        messages.push(ChatMessage::new("user", prompt));
        messages
    }

    /// Exponential backoff with a little deterministic jitter
    fn retry_backoff(attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let base_ms = RETRY_BASE_DELAY_MS.saturating_mul(exp);
        let jitter = 1.0 + ((attempt as f64 * 0.37).sin() * 0.1);
        Duration::from_millis((base_ms as f64 * jitter) as u64)
    }

    async fn send_once(
        &self,
        request: &ChatRequest<'_>,
        timeout: Duration,
    ) -> std::result::Result<String, AttemptError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).timeout(timeout).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(Self::map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = truncate_error_detail(&extract_error_detail(&body), MAX_ERROR_DETAIL_CHARS);
            let message = if detail.is_empty() {
                format!("API error {status}")
            } else {
                format!("API error {status}: {detail}")
            };
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AttemptError::retryable(message)
            } else {
                AttemptError::fatal(message)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(format!("malformed response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AttemptError::fatal("response contained no choices"))
    }

    fn map_reqwest_error(e: reqwest::Error) -> AttemptError {
        if e.is_timeout() {
            AttemptError::retryable(format!("timeout: {e}"))
        } else if e.is_connect() || e.is_request() {
            AttemptError::retryable(format!("network: {e}"))
        } else {
            AttemptError::fatal(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ExchangeRecord],
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(prompt, context),
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            repetition_penalty: sampling.repetition_penalty,
            stream: false,
        };
        debug!(
            "Calling chat completions with {} messages, prompt length {}",
            request.messages.len(),
            prompt.len()
        );

        let deadline = Instant::now() + timeout;
        let mut last_err = String::from("no attempt made");
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = Self::retry_backoff(attempt);
                if Instant::now() + delay >= deadline {
                    break;
                }
                warn!(
                    "Generation request failed (attempt {}/{}), retrying in {:?}...",
                    attempt, MAX_RETRY_ATTEMPTS, delay
                );
                tokio::time::sleep(delay).await;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.send_once(&request, remaining).await {
                Ok(content) => return Ok(content),
                Err(e) if e.retryable => last_err = e.message,
                Err(e) => return Err(HalcyonError::Generation(e.message)),
            }
        }

        Err(HalcyonError::Generation(last_err))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Pull a human-readable message out of an error body
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

fn truncate_error_detail(detail: &str, max_chars: usize) -> String {
    if detail.chars().count() <= max_chars {
        return detail.to_string();
    }

    let mut truncated = detail.chars().take(max_chars).collect::<String>();
    truncated.push_str("... [truncated]");
    truncated
}
