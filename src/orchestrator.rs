//! Interaction orchestrator
//!
//! One utterance in, one reply out: validate, read context, generate outside
//! any lock, then commit the exchange through the store's critical section.

use crate::config::{FailurePolicy, HalcyonConfig, InteractionSettings};
use crate::generation::{GenerationClient, SamplingConfig};
use crate::memory::{ExchangeRecord, MemoryStore};
use crate::{preview, HalcyonError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs the orchestrator needs from the configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_input_chars: usize,
    pub context_exchanges: usize,
    pub failure_policy: FailurePolicy,
    pub fallback_response: String,
    pub timeout: Duration,
    pub sampling: SamplingConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let interaction = InteractionSettings::default();
        Self {
            max_input_chars: interaction.max_input_chars,
            context_exchanges: 5,
            failure_policy: interaction.failure_policy,
            fallback_response: interaction.fallback_response,
            timeout: Duration::from_secs(30),
            sampling: SamplingConfig::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &HalcyonConfig) -> Self {
        let generation = &config.generation;
        Self {
            max_input_chars: config.interaction.max_input_chars,
            context_exchanges: generation.context_exchanges,
            failure_policy: config.interaction.failure_policy,
            fallback_response: config.interaction.fallback_response.clone(),
            timeout: generation.timeout,
            sampling: generation.sampling.clone(),
        }
    }
}

/// Reply to one utterance plus metadata
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    /// Length of the trimmed input, in characters
    pub input_length: usize,
    /// Length of the reply, in characters
    pub response_length: usize,
    /// Set when the reply is the fallback text rather than generated
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Pull the `input` string out of a request payload.
pub fn extract_input(payload: &Value) -> Result<&str> {
    let object = payload
        .as_object()
        .ok_or_else(|| HalcyonError::Validation("Request body must be a JSON object".to_string()))?;
    match object.get("input") {
        None | Some(Value::Null) => Err(HalcyonError::Validation(
            "Missing 'input' field or empty input".to_string(),
        )),
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(HalcyonError::Validation("'input' must be a string".to_string())),
    }
}

/// Trim and check an utterance; returns the text that will be processed.
pub fn validate_input(raw: &str, max_chars: usize) -> Result<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(HalcyonError::Validation(
            "Missing 'input' field or empty input".to_string(),
        ));
    }
    if text.chars().count() > max_chars {
        return Err(HalcyonError::Validation(format!(
            "Input too long (max {} chars)",
            max_chars
        )));
    }
    Ok(text.to_string())
}

/// Turns utterances into replies while keeping the memory store consistent
pub struct InteractionOrchestrator {
    store: Arc<MemoryStore>,
    client: Arc<dyn GenerationClient>,
    settings: OrchestratorSettings,
}

impl InteractionOrchestrator {
    pub fn new(
        store: Arc<MemoryStore>,
        client: Arc<dyn GenerationClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            client,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    /// Handle a raw JSON payload of the form `{"input": "<text>"}`
    pub async fn interact_payload(&self, payload: &Value) -> Result<Interaction> {
        let input = extract_input(payload)?;
        self.interact(input).await
    }

    /// Handle one utterance.
    ///
    /// Validation failures are returned before the provider is called. A
    /// provider failure or timeout records nothing and, under
    /// [`FailurePolicy::Mask`], is answered with the fallback reply.
    pub async fn interact(&self, raw_input: &str) -> Result<Interaction> {
        let input = validate_input(raw_input, self.settings.max_input_chars).map_err(|e| {
            debug!("Rejected input: {}", e);
            e
        })?;
        info!("Received: {}", preview(&input, 50));

        // Snapshot taken under the store lock; the lock is released here.
        let context = self.store.recent(self.settings.context_exchanges).await;

        let generated = tokio::time::timeout(
            self.settings.timeout,
            self.client
                .generate(&input, &context, &self.settings.sampling, self.settings.timeout),
        )
        .await
        .unwrap_or_else(|_| {
            Err(HalcyonError::Generation(format!(
                "timed out after {:?}",
                self.settings.timeout
            )))
        });

        let response = match generated {
            Ok(text) => text,
            Err(e) => return self.on_generation_failure(&input, e),
        };

        let record = ExchangeRecord::new(input.clone(), response.clone());
        let timestamp = record.timestamp;
        let outcome = self.store.commit(record).await;
        if !outcome.durable {
            warn!("Exchange kept in memory only; persisting failed");
        }
        info!("Response: {}", preview(&response, 50));

        Ok(Interaction {
            input_length: input.chars().count(),
            response_length: response.chars().count(),
            response,
            timestamp,
            fallback: false,
        })
    }

    fn on_generation_failure(&self, input: &str, error: HalcyonError) -> Result<Interaction> {
        warn!(
            "Generation via {} failed for input '{}': {}",
            self.client.name(),
            preview(input, 50),
            error
        );
        match self.settings.failure_policy {
            FailurePolicy::Strict => Err(error),
            FailurePolicy::Mask => {
                let response = self.settings.fallback_response.clone();
                Ok(Interaction {
                    input_length: input.chars().count(),
                    response_length: response.chars().count(),
                    response,
                    timestamp: Utc::now(),
                    fallback: true,
                })
            }
        }
    }
}
