//! Cleanup applied to provider replies
//!
//! [`ShapedClient`] wraps a provider so every reply it returns is already
//! shaped; the orchestrator stores whatever its client hands back.

use super::{GenerationClient, SamplingConfig};
use crate::memory::ExchangeRecord;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Substituted when a provider returns (almost) nothing
pub const SHORT_RESPONSE_REPLY: &str = "That's interesting! Can you tell me more?";

static ROLE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:Human|AI):").unwrap());

/// Strips transcript role markers and enforces length limits (in chars).
#[derive(Debug, Clone, Copy)]
pub struct ResponseShaper {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ResponseShaper {
    fn default() -> Self {
        Self {
            min_chars: 10,
            max_chars: 500,
        }
    }
}

impl ResponseShaper {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self { min_chars, max_chars }
    }

    pub fn shape(&self, raw: &str) -> String {
        let cleaned = ROLE_MARKER.replace_all(raw, "");
        let cleaned = cleaned.trim();

        let text = if cleaned.chars().count() < self.min_chars {
            SHORT_RESPONSE_REPLY
        } else {
            cleaned
        };

        match text.char_indices().nth(self.max_chars) {
            Some((cut, _)) => text[..cut].trim_end().to_string(),
            None => text.to_string(),
        }
    }
}

/// Provider decorator that applies a [`ResponseShaper`] to every reply
pub struct ShapedClient {
    inner: Arc<dyn GenerationClient>,
    shaper: ResponseShaper,
}

impl ShapedClient {
    pub fn new(inner: Arc<dyn GenerationClient>, shaper: ResponseShaper) -> Self {
        Self { inner, shaper }
    }
}

#[async_trait]
impl GenerationClient for ShapedClient {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ExchangeRecord],
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> Result<String> {
        let raw = self.inner.generate(prompt, context, sampling, timeout).await?;
        Ok(self.shaper.shape(&raw))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
