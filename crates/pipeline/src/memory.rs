//! Cross-run memory: which topics and hooks earlier runs already used.
//!
//! The [`MemoryRecord`] is the persisted document; the [`MemoryStore`] port
//! loads it at the start of a run and applies a run's [`MemoryUpdate`]s.
//! Storage adapters live in the `storage` crate.
//!
//! Topics and hooks behave as ordered sets keyed by normalised text: trimmed,
//! lower-cased, internal whitespace collapsed. The first spelling seen is the
//! one kept for display.
//!
//! ## Document shape
//!
//! ```json
//! {
//!   "version": 1,
//!   "pastTopics": ["Async logging"],
//!   "pastHooks": ["Stop blocking on log writes."],
//!   "topicSeenAt": { "async logging": "2026-10-17T09:00:00Z" },
//!   "lastUpdated": "2026-10-17T09:00:00Z"
//! }
//! ```
//!
//! Maps are sorted and field order is fixed, so re-serialising a decoded
//! record reproduces the original bytes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{MemoryError, Timestamp};

/// Current document version written by [`MemoryRecord::to_document`].
pub const MEMORY_RECORD_VERSION: u32 = 1;

/// Normalised form used for set membership.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Persisted history of topics and hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    past_topics: Vec<String>,
    #[serde(default)]
    past_hooks: Vec<String>,
    #[serde(default)]
    topic_seen_at: BTreeMap<String, Timestamp>,
    #[serde(default)]
    last_updated: Option<Timestamp>,
}

fn default_version() -> u32 {
    MEMORY_RECORD_VERSION
}

impl Default for MemoryRecord {
    fn default() -> Self {
        Self::empty()
    }
}

impl MemoryRecord {
    /// The well-formed record used on cold start.
    pub fn empty() -> Self {
        Self {
            version: MEMORY_RECORD_VERSION,
            past_topics: Vec::new(),
            past_hooks: Vec::new(),
            topic_seen_at: BTreeMap::new(),
            last_updated: None,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Topics in first-seen order.
    pub fn past_topics(&self) -> &[String] {
        &self.past_topics
    }

    /// Hooks in first-seen order.
    pub fn past_hooks(&self) -> &[String] {
        &self.past_hooks
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    pub fn contains_topic(&self, topic: &str) -> bool {
        let key = normalize(topic);
        self.past_topics.iter().any(|t| normalize(t) == key)
    }

    pub fn contains_hook(&self, hook: &str) -> bool {
        let key = normalize(hook);
        self.past_hooks.iter().any(|h| normalize(h) == key)
    }

    /// Records `topic` as used at `at`. Returns `true` if it was not yet known.
    ///
    /// Re-adding a known topic refreshes its last-seen time and nothing else.
    /// Blank topics are ignored.
    pub fn upsert_topic(&mut self, topic: &str, at: Timestamp) -> bool {
        let key = normalize(topic);
        if key.is_empty() {
            return false;
        }
        let seen = self.topic_seen_at.entry(key).or_insert(at);
        if at > *seen {
            *seen = at;
        }
        self.touch(at);
        if self.contains_topic(topic) {
            return false;
        }
        self.past_topics.push(topic.trim().to_string());
        true
    }

    /// Records `hook` as used. Returns `true` if it was not yet known.
    pub fn upsert_hook(&mut self, hook: &str, at: Timestamp) -> bool {
        if normalize(hook).is_empty() || self.contains_hook(hook) {
            return false;
        }
        self.past_hooks.push(hook.trim().to_string());
        self.touch(at);
        true
    }

    /// `true` iff `topic` was last used no more than `window_days` before `now`.
    pub fn is_recent(&self, topic: &str, window_days: u32, now: Timestamp) -> bool {
        self.topic_seen_at
            .get(&normalize(topic))
            .is_some_and(|seen| seen.is_within_days_of(now, window_days))
    }

    /// Topics (display spelling) used within the window.
    pub fn recent_topics(&self, window_days: u32, now: Timestamp) -> Vec<String> {
        self.past_topics
            .iter()
            .filter(|t| self.is_recent(t, window_days, now))
            .cloned()
            .collect()
    }

    /// Applies every upsert in `update`. Returns `true` if anything changed.
    pub fn apply(&mut self, update: &MemoryUpdate) -> bool {
        let before = self.clone();
        for topic in &update.topics {
            self.upsert_topic(topic, update.at);
        }
        for hook in &update.hooks {
            self.upsert_hook(hook, update.at);
        }
        *self != before
    }

    /// Serialises the record as a pretty-printed JSON document.
    pub fn to_document(&self) -> Result<String, MemoryError> {
        serde_json::to_string_pretty(self).map_err(|e| MemoryError::Serialization(e.to_string()))
    }

    /// Parses a document produced by [`Self::to_document`].
    pub fn from_document(raw: &str) -> Result<Self, MemoryError> {
        serde_json::from_str(raw).map_err(|e| MemoryError::Corrupt(e.to_string()))
    }

    fn touch(&mut self, at: Timestamp) {
        if self.last_updated.is_none_or(|prev| at > prev) {
            self.last_updated = Some(at);
        }
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Topics and hooks a run wants remembered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub topics: Vec<String>,
    pub hooks: Vec<String>,
    pub at: Timestamp,
}

impl MemoryUpdate {
    pub fn new(at: Timestamp) -> Self {
        Self {
            topics: Vec::new(),
            hooks: Vec::new(),
            at,
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.hooks.push(hook.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.hooks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Persistence port for the process-wide [`MemoryRecord`].
///
/// Implementations must serialise concurrent `persist` calls and apply each
/// update to the latest stored record, so no run's upserts are lost.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Loads the current record; an empty record when nothing was stored yet.
    async fn load(&self) -> Result<MemoryRecord, MemoryError>;

    /// Applies `update` to the stored record and replaces it crash-safely.
    /// Returns the record as written.
    async fn persist(&self, update: &MemoryUpdate) -> Result<MemoryRecord, MemoryError>;
}
