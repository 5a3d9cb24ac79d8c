//! Shared execution state: the per-run, append-only accumulator.
//!
//! One [`SharedState`] exists per run and is owned by the coordinator. Agents
//! never see it directly; each request carries a [`StateSnapshot`], an
//! immutable copy taken at dispatch time, so nothing an agent holds can change
//! underneath it.
//!
//! [`SharedState::merge`] is the only mutator. A field, once set, keeps its
//! value for the rest of the run: re-setting it is a [`StateError::Conflict`],
//! and a conflicting update writes nothing at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FieldName, Payload, StateError, StepNumber};

/// Names of the fields the coordinator and the built-in agents agree on.
pub mod fields {
    /// Admitted content idea (string).
    pub const CONTENT_IDEA: &str = "content_idea";
    /// Admitted platform names (array of strings).
    pub const PLATFORMS: &str = "platforms";
    /// Optional target audience (string or null).
    pub const AUDIENCE: &str = "audience";

    /// Memory topics, in first-seen order (request-only).
    pub const PAST_TOPICS: &str = "past_topics";
    /// Memory hooks, in first-seen order (request-only).
    pub const PAST_HOOKS: &str = "past_hooks";
    /// Memory topics seen within the recency window (request-only).
    pub const RECENT_TOPICS: &str = "recent_topics";

    /// Topic string a step wants remembered across runs.
    pub const TOPIC: &str = "topic";
    /// Hook string a step wants remembered across runs.
    pub const HOOK: &str = "hook";

    /// Long-form content produced by the writing step.
    pub const CORE_CONTENT: &str = "core_content";
    /// Per-platform adaptations, keyed by platform name.
    pub const ADAPTATIONS: &str = "adaptations";
    /// Publication schedule entries.
    pub const SCHEDULE: &str = "schedule";
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable copy of the shared state embedded in outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot(BTreeMap<String, Value>);

impl StateSnapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the field if it is a non-empty string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// The accumulating record threaded through one workflow run.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    values: BTreeMap<FieldName, Value>,
    written_by: BTreeMap<FieldName, StepNumber>,
}

impl SharedState {
    /// Creates an empty state for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every field of `update` on behalf of `step`.
    ///
    /// Fails with [`StateError::Conflict`] if any field is already present,
    /// in which case the state is left exactly as it was.
    pub fn merge(&mut self, step: StepNumber, update: &Payload) -> Result<(), StateError> {
        let mut staged = Vec::with_capacity(update.len());
        for (key, value) in update.iter() {
            // Payload keys are never blank once they reach a merge: they come
            // from registry contracts or the seeded input.
            let Some(field) = FieldName::new(key.as_str()) else {
                continue;
            };
            if let Some(written_by) = self.written_by.get(&field) {
                return Err(StateError::Conflict {
                    field,
                    written_by: *written_by,
                });
            }
            staged.push((field, value.clone()));
        }

        for (field, value) in staged {
            self.written_by.insert(field.clone(), step);
            self.values.insert(field, value);
        }
        Ok(())
    }

    /// Takes an immutable copy for embedding in a request envelope.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot(
            self.values
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        FieldName::new(field).and_then(|f| self.values.get(&f))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// The step that wrote `field`, if it has been set.
    pub fn written_by(&self, field: &str) -> Option<StepNumber> {
        FieldName::new(field).and_then(|f| self.written_by.get(&f).copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_accumulates_fields_across_steps() {
        let mut state = SharedState::new();
        state
            .merge(StepNumber::INPUT, &Payload::new().with("content_idea", json!("x")))
            .unwrap();
        state
            .merge(StepNumber::FIRST, &Payload::new().with("theme", json!("craft")))
            .unwrap();

        assert_eq!(state.len(), 2);
        assert_eq!(state.written_by("theme"), Some(StepNumber::FIRST));
        assert_eq!(state.written_by("content_idea"), Some(StepNumber::INPUT));
    }

    #[test]
    fn merging_same_field_twice_is_a_conflict() {
        let mut state = SharedState::new();
        state
            .merge(StepNumber::FIRST, &Payload::new().with("theme", json!("craft")))
            .unwrap();

        let err = state
            .merge(
                StepNumber::new(2),
                &Payload::new().with("theme", json!("something else")),
            )
            .unwrap_err();
        assert_eq!(
            err,
            StateError::Conflict {
                field: FieldName::new("theme").unwrap(),
                written_by: StepNumber::FIRST,
            }
        );
        assert_eq!(state.get("theme"), Some(&json!("craft")));
    }

    #[test]
    fn conflicting_update_writes_nothing() {
        let mut state = SharedState::new();
        state
            .merge(StepNumber::FIRST, &Payload::new().with("theme", json!("craft")))
            .unwrap();

        let update = Payload::new()
            .with("angle", json!("new"))
            .with("theme", json!("again"));
        assert!(state.merge(StepNumber::new(2), &update).is_err());
        assert!(!state.contains("angle"));
    }

    #[test]
    fn snapshot_is_detached_from_later_merges() {
        let mut state = SharedState::new();
        state
            .merge(StepNumber::FIRST, &Payload::new().with("theme", json!("craft")))
            .unwrap();
        let snapshot = state.snapshot();

        state
            .merge(StepNumber::new(2), &Payload::new().with("angle", json!("how-to")))
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains("angle"));
        assert_eq!(snapshot.get_str("theme"), Some("craft"));
    }
}
