//! Memory module for Halcyon
//!
//! Provides the bounded conversation log, its storage backends, and the store
//! that serializes every mutation.

mod backend;
mod log;
mod store;

pub use backend::{FileBackend, InMemoryBackend, MemoryBackend};
pub use log::{ConversationLog, ExchangeRecord, DEFAULT_MAX_SIZE};
pub use store::{CommitOutcome, Decoded, MemoryStore};
