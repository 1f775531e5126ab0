//! Generation module for Halcyon
//!
//! The core only depends on [`GenerationClient`]; providers live behind it.

mod echo;
mod openai;
mod postprocess;

pub use echo::EchoClient;
pub use openai::ChatCompletionsClient;
pub use postprocess::{ResponseShaper, ShapedClient, SHORT_RESPONSE_REPLY};

use crate::memory::ExchangeRecord;
use crate::{HalcyonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters forwarded to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nucleus-sampling threshold
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.8,
            top_p: 0.9,
            repetition_penalty: 1.1,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(HalcyonError::Config("sampling.max_tokens must be at least 1".to_string()));
        }
        if !(self.temperature >= 0.0 && self.temperature.is_finite()) {
            return Err(HalcyonError::Config(format!(
                "sampling.temperature must be >= 0, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(HalcyonError::Config(format!(
                "sampling.top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !(self.repetition_penalty > 0.0 && self.repetition_penalty.is_finite()) {
            return Err(HalcyonError::Config(format!(
                "sampling.repetition_penalty must be > 0, got {}",
                self.repetition_penalty
            )));
        }
        Ok(())
    }
}

/// External capability that turns a prompt (plus prior exchanges) into text.
///
/// Implementations should give up once `timeout` has elapsed; callers enforce
/// the same deadline independently.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ExchangeRecord],
        sampling: &SamplingConfig,
        timeout: Duration,
    ) -> Result<String>;

    /// Provider name for logs and health output
    fn name(&self) -> &str;
}
