//! Exchange records and the bounded conversation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of exchanges kept in the log
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// One user utterance and the reply it produced.
///
/// Persisted as `{"timestamp", "user", "ai"}`. Older documents stored only
/// `user` and `ai`; those decode with the Unix epoch as timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    #[serde(default = "legacy_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "ai")]
    pub ai_text: String,
}

fn legacy_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ExchangeRecord {
    /// Create a record stamped with the current time
    pub fn new(user_text: impl Into<String>, ai_text: impl Into<String>) -> Self {
        Self::at(Utc::now(), user_text, ai_text)
    }

    /// Create a record with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        user_text: impl Into<String>,
        ai_text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            user_text: user_text.into(),
            ai_text: ai_text.into(),
        }
    }
}

/// Ordered, size-bounded sequence of exchanges, oldest first.
///
/// Invariant: `len() <= max_size()` after every mutation. Pushing onto a full
/// log evicts from the front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationLog {
    records: VecDeque<ExchangeRecord>,
    max_size: usize,
}

impl ConversationLog {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_size,
        }
    }

    /// Build a log from decoded records, keeping only the most recent `max_size`.
    pub fn from_records(records: impl IntoIterator<Item = ExchangeRecord>, max_size: usize) -> Self {
        let mut log = Self {
            records: records.into_iter().collect(),
            max_size,
        };
        log.enforce_bound();
        log
    }

    /// Append a record, evicting the oldest ones if the bound is exceeded.
    /// Returns the number of evicted records.
    pub fn push(&mut self, record: ExchangeRecord) -> usize {
        self.records.push_back(record);
        self.enforce_bound()
    }

    /// Consuming variant of [`push`](Self::push)
    pub fn with_record(mut self, record: ExchangeRecord) -> Self {
        self.push(record);
        self
    }

    fn enforce_bound(&mut self) -> usize {
        let excess = self.records.len().saturating_sub(self.max_size);
        self.records.drain(..excess);
        excess
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExchangeRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&ExchangeRecord> {
        self.records.back()
    }

    /// The most recent `n` records, oldest first
    pub fn recent(&self, n: usize) -> Vec<ExchangeRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records.iter().skip(start).cloned().collect()
    }

    /// Serialize the whole log as one JSON document (array of records).
    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a ExchangeRecord;
    type IntoIter = std::collections::vec_deque::Iter<'a, ExchangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
