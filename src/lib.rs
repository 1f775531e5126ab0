//! Halcyon - conversational service with bounded memory
//!
//! A small HTTP service that wraps a text-generation provider:
//! - Validates each utterance before anything else happens
//! - Keeps a bounded, persisted log of exchanges behind a single writer lock
//! - Masks provider failures with a fixed fallback reply (configurable)

pub mod api;
pub mod config;
pub mod generation;
pub mod memory;
pub mod orchestrator;
pub mod repl;

pub use config::{FailurePolicy, HalcyonConfig};
pub use generation::{GenerationClient, SamplingConfig};
pub use memory::{ConversationLog, ExchangeRecord, MemoryStore};
pub use orchestrator::{Interaction, InteractionOrchestrator};

/// Result type for Halcyon operations
pub type Result<T> = std::result::Result<T, HalcyonError>;

/// Errors that can occur in Halcyon
#[derive(Debug, thiserror::Error)]
pub enum HalcyonError {
    /// Rejected user input; the message is safe to show to the caller.
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HalcyonError {
    /// Whether this error is the caller's fault rather than a server fault
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Shorten text for log lines, respecting char boundaries.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
