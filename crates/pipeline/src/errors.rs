//! Error taxonomy and retry-policy types for the Cadence coordination domain.
//!
//! Every failure the coordinator can meet falls into one [`ErrorKind`], and
//! every [`StepError`] can say whether it is safe to retry through
//! [`StepError::retry_policy`]. Component-level errors (registry, state,
//! memory, trace, state-machine) are small enums of their own so each module
//! can be tested without the coordinator.
//!
//! | Kind | Raised by | Retry |
//! |------|-----------|-------|
//! | `InputValidation` | input admission | never; the run never starts |
//! | `AgentExecution` | timeout, error status, invalid response, agent panic | up to the back-off budget |
//! | `Communication` | request envelope fails validation | one rebuild |
//! | `StateManagement` | merge conflict, registry/trace violation | never, fatal |
//! | `StateManagement` | memory persistence | never, logged only |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AgentId, FieldName, Platform, StepNumber};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`StepError::retry_policy`] to let the coordinator decide
/// whether to re-dispatch a step without halting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
        /// Maximum number of extra attempts this class of failure is allowed.
        /// `None` means the caller's configured budget.
        max_retries: Option<u32>,
    },
    /// The operation must not be retried; the run halts.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

/// Classification of every failure the coordinator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad workflow input; rejected before any run starts.
    InputValidation,
    /// An agent timed out, reported an error, panicked or answered with an
    /// invalid response.
    AgentExecution,
    /// An envelope could not be built into a valid message.
    Communication,
    /// Shared-state, registry, trace or memory bookkeeping failed.
    StateManagement,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::AgentExecution => "agent_execution",
            ErrorKind::Communication => "communication",
            ErrorKind::StateManagement => "state_management",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Input admission
// ---------------------------------------------------------------------------

/// Reasons a workflow input is refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("content idea is empty")]
    EmptyIdea,

    #[error("content idea is {len} characters; at least {min} required")]
    IdeaTooShort { len: usize, min: usize },

    #[error("content idea is {len} characters; at most {max} allowed")]
    IdeaTooLong { len: usize, max: usize },

    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("platform {0} listed more than once")]
    DuplicatePlatform(Platform),

    #[error("{count} platforms requested; between {min} and {max} required")]
    PlatformCount { count: usize, min: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Envelope validation
// ---------------------------------------------------------------------------

/// Why an envelope failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMessage {
    /// A mandatory field is absent or empty.
    #[error("missing mandatory field '{0}'")]
    MissingField(&'static str),

    /// The schema version is not one the receiver declares support for.
    #[error("unsupported schema version '{version}'")]
    UnsupportedSchemaVersion { version: String },

    /// The response status is not `success`, `error` or `partial`.
    #[error("unrecognised status '{0}'")]
    UnknownStatus(String),

    /// Fields that must agree with each other do not.
    #[error("inconsistent envelope: {0}")]
    Inconsistent(String),

    /// A successful response lacks a field its output contract requires.
    #[error("output contract violated: missing field '{0}'")]
    ContractViolation(FieldName),

    /// The wire document could not be decoded at all.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Component errors
// ---------------------------------------------------------------------------

/// Agent registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An agent name that cannot form an [`AgentId`].
    #[error("invalid agent id {0:?}")]
    InvalidAgentId(String),

    #[error("agent '{0}' is already registered")]
    DuplicateAgent(AgentId),

    #[error("agent '{0}' is not registered")]
    NotFound(AgentId),

    #[error("agent '{agent}' depends on unregistered agent '{dependency}'")]
    UnknownDependency { agent: AgentId, dependency: AgentId },

    /// The listed agents could not be ordered because they depend on each other.
    #[error("cyclic dependency among agents: {}", display_ids(.0))]
    CyclicDependency(Vec<AgentId>),
}

fn display_ids(ids: &[AgentId]) -> String {
    ids.iter().map(AgentId::as_str).collect::<Vec<_>>().join(", ")
}

/// Shared-state merge failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The update tried to set a field that an earlier step already wrote.
    #[error("field '{field}' was already set by step {written_by}")]
    Conflict {
        field: FieldName,
        written_by: StepNumber,
    },
}

/// Memory store failures. Always logged, never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory store I/O failed: {0}")]
    Io(String),

    #[error("memory record is corrupt: {0}")]
    Corrupt(String),

    #[error("memory record could not be serialised: {0}")]
    Serialization(String),
}

/// Trace bookkeeping failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace entry for step {got} recorded out of order; expected step {expected}")]
    OutOfOrder {
        expected: StepNumber,
        got: StepNumber,
    },
}

/// An illegal state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

// ---------------------------------------------------------------------------
// Step failures
// ---------------------------------------------------------------------------

/// One failed attempt (or a fatal bookkeeping failure) while executing a step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// The agent did not answer within the step timeout.
    #[error("agent '{agent}' did not respond within {after:?}")]
    Timeout { agent: AgentId, after: Duration },

    /// The agent answered with an `error` or `partial` status.
    #[error("agent '{agent}' reported {code}: {message}")]
    AgentReported {
        agent: AgentId,
        code: String,
        message: String,
    },

    /// The agent's response failed validation.
    #[error("agent '{agent}' returned an invalid response: {source}")]
    InvalidResponse {
        agent: AgentId,
        #[source]
        source: InvalidMessage,
    },

    /// The agent panicked; the fault was contained at the dispatch boundary.
    #[error("agent '{agent}' faulted: {message}")]
    AgentFault { agent: AgentId, message: String },

    /// The coordinator could not build a valid request for the agent.
    #[error("request to agent '{agent}' is invalid: {source}")]
    InvalidRequest {
        agent: AgentId,
        #[source]
        source: InvalidMessage,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StepError {
    /// The taxonomy class of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Timeout { .. }
            | StepError::AgentReported { .. }
            | StepError::InvalidResponse { .. }
            | StepError::AgentFault { .. } => ErrorKind::AgentExecution,
            StepError::InvalidRequest { .. } => ErrorKind::Communication,
            StepError::State(_)
            | StepError::Registry(_)
            | StepError::Trace(_)
            | StepError::Transition(_) => ErrorKind::StateManagement,
        }
    }

    /// Whether the coordinator may re-dispatch after this failure.
    ///
    /// Communication failures get exactly one rebuild; agent-execution
    /// failures use the configured back-off budget.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.kind() {
            ErrorKind::AgentExecution => RetryPolicy::Retryable {
                after: None,
                max_retries: None,
            },
            ErrorKind::Communication => RetryPolicy::Retryable {
                after: Some(Duration::ZERO),
                max_retries: Some(1),
            },
            ErrorKind::InputValidation | ErrorKind::StateManagement => RetryPolicy::NonRetryable,
        }
    }

    /// Short machine-readable code for failure records.
    pub fn code(&self) -> &str {
        match self {
            StepError::Timeout { .. } => "timeout",
            StepError::AgentReported { code, .. } => code,
            StepError::InvalidResponse { .. } => "invalid_response",
            StepError::AgentFault { .. } => "agent_fault",
            StepError::InvalidRequest { .. } => "invalid_request",
            StepError::State(_) => "state_conflict",
            StepError::Registry(_) => "registry",
            StepError::Trace(_) => "trace",
            StepError::Transition(_) => "invalid_transition",
        }
    }
}
