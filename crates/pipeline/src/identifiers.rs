//! Newtype domain identifiers.
//!
//! Every concept with an identity gets its own newtype so that, for example, an
//! [`AgentId`] can never be passed where a [`FieldName`] is expected even though
//! both are strings underneath.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is blank.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the wrapped value is blank.
            ///
            /// Only reachable for values decoded from the wire, which bypass
            /// [`Self::new`].
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes (internally generated).
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID (e.g. deserialised from a record).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }

            /// Returns `true` for the all-zero UUID, which is never generated.
            pub fn is_nil(self) -> bool {
                self.0.is_nil()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifies a single workflow run.
    ///
    /// Generated fresh for every run; propagated through spans, envelopes and
    /// the output record so all activity from one run can be correlated.
    WorkflowId
}

uuid_id! {
    /// Identifies one envelope. Every dispatch attempt gets a new id, retries
    /// included.
    MessageId
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies an agent in the [`crate::AgentRegistry`], and the coordinator
    /// itself when it acts as an envelope sender.
    AgentId
}

impl AgentId {
    /// Sender id the coordinator stamps on its requests.
    pub const COORDINATOR: &'static str = "coordinator";

    /// The coordinator's own identity.
    pub fn coordinator() -> Self {
        Self(Self::COORDINATOR.to_string())
    }
}

string_id! {
    /// Names a field of the [`crate::SharedState`] or a key of a [`crate::Payload`].
    FieldName
}

// ---------------------------------------------------------------------------
// Step numbering
// ---------------------------------------------------------------------------

/// 1-based position of a step within a run's resolved order.
///
/// Step `0` is reserved for the workflow input seeded into the shared state
/// before any agent runs; it never appears in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepNumber(u32);

impl StepNumber {
    /// The pseudo-step that owns the seeded workflow input.
    pub const INPUT: StepNumber = StepNumber(0);

    /// The first agent step.
    pub const FIRST: StepNumber = StepNumber(1);

    /// Creates a step number from a raw integer.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the following step.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns `true` for the seeded-input pseudo-step.
    pub fn is_input(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for StepNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
