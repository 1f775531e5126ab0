//! Offline provider that reflects the utterance back

use super::{GenerationClient, SamplingConfig};
use crate::memory::ExchangeRecord;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Deterministic provider used when no remote model is configured
#[derive(Debug, Clone, Default)]
pub struct EchoClient;

impl EchoClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationClient for EchoClient {
    async fn generate(
        &self,
        prompt: &str,
        context: &[ExchangeRecord],
        _sampling: &SamplingConfig,
        _timeout: Duration,
    ) -> Result<String> {
        let reply = match context.last() {
            Some(previous) => format!(
                "You said: \"{}\". Last time you said: \"{}\".",
                prompt, previous.user_text
            ),
            None => format!("You said: \"{}\".", prompt),
        };
        Ok(reply)
    }

    fn name(&self) -> &str {
        "echo"
    }
}
