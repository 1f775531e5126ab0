//! Memory store: sole owner of the persisted conversation log
//!
//! Every mutation (append, persist, clear) runs under one async mutex, so two
//! concurrent interactions can never both start from the same log length and
//! overwrite each other's exchange. Reads hand out clones taken under the same
//! lock; nobody holds the lock across a generation call.

use super::backend::MemoryBackend;
use super::log::{ConversationLog, ExchangeRecord};
use crate::{HalcyonError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome of decoding a persisted document
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Document parsed; already truncated to the bound
    Loaded(ConversationLog),
    /// No document exists yet
    Missing,
    /// The backend could not read the document
    Unreadable(String),
    /// The document exists but is not a list of exchange records
    Corrupt(String),
}

impl Decoded {
    /// Collapse to a log; anything but `Loaded` yields an empty one.
    pub fn into_log(self, max_size: usize) -> ConversationLog {
        match self {
            Self::Loaded(log) => log,
            _ => ConversationLog::new(max_size),
        }
    }
}

/// Result of appending one exchange and persisting the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Log length after the append
    pub total: usize,
    /// Records evicted by the size bound
    pub evicted: usize,
    /// False when the write failed; the in-memory log still holds the record
    pub durable: bool,
}

/// Bounded conversation memory backed by a pluggable [`MemoryBackend`]
pub struct MemoryStore {
    backend: Arc<dyn MemoryBackend>,
    max_size: usize,
    /// Authoritative in-process copy of the log
    log: Mutex<ConversationLog>,
}

impl MemoryStore {
    /// Open a store, loading whatever the backend currently holds.
    pub async fn open(backend: Arc<dyn MemoryBackend>, max_size: usize) -> Self {
        let log = Self::load_from(backend.as_ref(), max_size).await;
        info!(
            "Memory store ready: {} entries (max {}) from {}",
            log.len(),
            max_size,
            backend.describe()
        );
        Self {
            backend,
            max_size,
            log: Mutex::new(log),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Decode a raw document into a bounded log.
    pub fn decode(raw: Option<&str>, max_size: usize) -> Decoded {
        let Some(raw) = raw else {
            return Decoded::Missing;
        };
        if raw.trim().is_empty() {
            return Decoded::Corrupt("document is empty".to_string());
        }
        match serde_json::from_str::<Vec<ExchangeRecord>>(raw) {
            Ok(records) => Decoded::Loaded(ConversationLog::from_records(records, max_size)),
            Err(e) => Decoded::Corrupt(e.to_string()),
        }
    }

    async fn load_from(backend: &dyn MemoryBackend, max_size: usize) -> ConversationLog {
        let decoded = match backend.read().await {
            Ok(raw) => Self::decode(raw.as_deref(), max_size),
            Err(e) => Decoded::Unreadable(e.to_string()),
        };
        match &decoded {
            Decoded::Loaded(log) => debug!("Loaded {} entries from {}", log.len(), backend.describe()),
            Decoded::Missing => debug!("No memory document at {}", backend.describe()),
            Decoded::Unreadable(reason) => {
                warn!("Memory document unreadable, starting empty: {}", reason)
            }
            Decoded::Corrupt(reason) => {
                warn!("Memory document corrupt, starting empty: {}", reason)
            }
        }
        decoded.into_log(max_size)
    }

    /// Read the persisted document. Never fails: a missing, unreadable or
    /// corrupt document yields an empty log.
    pub async fn load(&self) -> ConversationLog {
        Self::load_from(self.backend.as_ref(), self.max_size).await
    }

    /// Append to the in-process log and return the result. Does not persist.
    pub async fn append(&self, record: ExchangeRecord) -> ConversationLog {
        let mut log = self.log.lock().await;
        log.push(record);
        log.clone()
    }

    /// Write `log` as the whole document and make it the in-process log.
    ///
    /// On failure the in-process log is kept; only durability is lost.
    pub async fn persist(&self, log: &ConversationLog) -> Result<()> {
        let mut current = self.log.lock().await;
        let bounded = ConversationLog::from_records(log.iter().cloned(), self.max_size);
        let result = self.write_document(&bounded).await;
        *current = bounded;
        result
    }

    /// Append one exchange and persist, as a single critical section.
    pub async fn commit(&self, record: ExchangeRecord) -> CommitOutcome {
        let mut log = self.log.lock().await;
        let evicted = log.push(record);
        let durable = self.write_document(&log).await.is_ok();
        CommitOutcome {
            total: log.len(),
            evicted,
            durable,
        }
    }

    async fn write_document(&self, log: &ConversationLog) -> Result<()> {
        let result = match log.to_document() {
            Ok(document) => self.backend.write(&document).await,
            Err(e) => Err(HalcyonError::Storage(format!("failed to encode log: {}", e))),
        };
        if let Err(e) = &result {
            error!("Failed to persist memory ({} entries): {}", log.len(), e);
        }
        result
    }

    /// Clone of the current log taken under the lock
    pub async fn snapshot(&self) -> ConversationLog {
        self.log.lock().await.clone()
    }

    /// The most recent `n` exchanges, oldest first
    pub async fn recent(&self, n: usize) -> Vec<ExchangeRecord> {
        self.log.lock().await.recent(n)
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.lock().await.is_empty()
    }

    /// Whether the backend currently holds a document
    pub async fn document_exists(&self) -> bool {
        self.backend.exists().await
    }

    /// Remove the persisted document and reset the log. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut log = self.log.lock().await;
        self.backend.remove().await.map_err(|e| {
            error!("Failed to clear memory: {}", e);
            e
        })?;
        *log = ConversationLog::new(self.max_size);
        info!("Memory cleared");
        Ok(())
    }

    /// Copy the current log to another backend as a full document.
    /// Returns the number of entries written.
    pub async fn backup(&self, target: &dyn MemoryBackend) -> Result<usize> {
        let log = self.snapshot().await;
        let document = log
            .to_document()
            .map_err(|e| HalcyonError::Storage(format!("failed to encode log: {}", e)))?;
        target.write(&document).await?;
        info!("Backed up {} entries to {}", log.len(), target.describe());
        Ok(log.len())
    }
}
