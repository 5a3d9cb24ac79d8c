//! Shared value types for the Cadence coordination domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (schema versions are non-empty, platforms
//! come from a closed set, payload keys are strings) and participate in
//! validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::FieldName;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`, clamped at zero.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        let millis = self.0.signed_duration_since(earlier.0).num_milliseconds();
        u64::try_from(millis).unwrap_or(0)
    }

    /// Returns `true` if `self` lies no more than `days` days before `now`.
    ///
    /// Timestamps in the future relative to `now` count as within the window.
    pub fn is_within_days_of(self, now: Timestamp, days: u32) -> bool {
        now.0.signed_duration_since(self.0) <= chrono::Duration::days(i64::from(days))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Envelope schema version tag (e.g. `"v1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// The version every built-in agent and the coordinator speak.
    pub const CURRENT: &'static str = "v1";

    /// Returns the current schema version.
    pub fn current() -> Self {
        Self(Self::CURRENT.to_string())
    }

    /// Creates a schema version, returning `None` if the tag is blank.
    pub fn new(tag: impl Into<String>) -> Option<Self> {
        let t = tag.into();
        if t.trim().is_empty() {
            None
        } else {
            Some(Self(t))
        }
    }

    /// Returns the version tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the tag is blank (only possible for wire-decoded values).
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The envelope versions an agent accepts: its current version plus an
/// explicit backward-compatible set. Anything else, newer versions included,
/// is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSupport {
    /// Version the agent natively speaks.
    pub current: SchemaVersion,
    /// Older versions the agent still understands.
    #[serde(default)]
    pub compatible: Vec<SchemaVersion>,
}

impl SchemaSupport {
    /// Supports exactly the current version.
    pub fn current_only() -> Self {
        Self {
            current: SchemaVersion::current(),
            compatible: Vec::new(),
        }
    }

    /// Adds a backward-compatible version.
    #[must_use]
    pub fn with_compatible(mut self, version: SchemaVersion) -> Self {
        if version != self.current && !self.compatible.contains(&version) {
            self.compatible.push(version);
        }
        self
    }

    /// Returns `true` if `version` is the current or a declared compatible version.
    pub fn accepts(&self, version: &SchemaVersion) -> bool {
        *version == self.current || self.compatible.contains(version)
    }
}

impl Default for SchemaSupport {
    fn default() -> Self {
        Self::current_only()
    }
}

// ---------------------------------------------------------------------------
// Platforms
// ---------------------------------------------------------------------------

/// A publishing platform a workflow can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    LinkedIn,
    Twitter,
    Instagram,
    Facebook,
    Threads,
}

impl Platform {
    /// Every known platform, in display order.
    pub const ALL: [Platform; 5] = [
        Platform::LinkedIn,
        Platform::Twitter,
        Platform::Instagram,
        Platform::Facebook,
        Platform::Threads,
    ];

    /// Canonical display name; also the key used in adaptation maps.
    pub fn name(self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::Twitter => "Twitter",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::Threads => "Threads",
        }
    }

    /// Maximum characters in a single post.
    pub fn char_limit(self) -> usize {
        match self {
            Platform::LinkedIn => 3000,
            Platform::Twitter => 280,
            Platform::Instagram => 2200,
            Platform::Facebook => 5000,
            Platform::Threads => 500,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a platform name is not in the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}'")]
pub struct UnknownPlatform(pub String);

impl std::str::FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "threads" => Ok(Platform::Threads),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Mapping of string keys to opaque structured values carried by envelopes.
///
/// Keys are free-form on the wire; agents look up the fields their contract
/// declares and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Inserts a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: &FieldName, value: Value) {
        self.0.insert(key.as_str().to_string(), value);
    }

    /// Builder-style [`Self::insert`] keyed by a plain string.
    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` if it is a non-empty string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Returns `true` if `key` is present with a non-null value.
    pub fn has_value(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(v) if !v.is_null())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Short human-readable description used in trace entries: the key list
    /// and the serialised size.
    pub fn summary(&self) -> String {
        if self.0.is_empty() {
            return "(empty)".to_string();
        }
        let keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        let bytes = serde_json::to_string(&self.0).map(|s| s.len()).unwrap_or(0);
        format!("{} ({} bytes)", keys.join(", "), bytes)
    }
}
