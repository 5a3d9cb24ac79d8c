//! Core coordination domain for Cadence.
//!
//! This crate contains every domain concept, newtype identifier, envelope
//! type, state machine and port trait used by the workflow coordinator.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; `storage` and `cli` define *how* to supply it,
//! and `nodes` sequences the calls.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`WorkflowId`, `AgentId`, `StepNumber`, etc.) |
//! | [`types`] | Shared value types (`Timestamp`, `SchemaVersion`, `Platform`, `Payload`) |
//! | [`envelope`] | Request/response envelopes and their validation |
//! | [`agent`] | The `Agent` plug-in trait |
//! | [`registry`] | Agent registry and order resolution |
//! | [`state`] | Append-only shared execution state |
//! | [`memory`] | Cross-run memory record and the `MemoryStore` port |
//! | [`trace`] | Execution trace |
//! | [`machine`] | Run/step state machines and back-off |
//! | [`request`] | Workflow input admission |
//! | [`output`] | Output and failure records |
//! | [`errors`] | Error taxonomy and retry policy |

pub mod agent;
pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod machine;
pub mod memory;
pub mod output;
pub mod registry;
pub mod request;
pub mod state;
pub mod trace;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use agent::Agent;
pub use envelope::{
    validate_request, validate_response, ErrorDetail, ExecutionContext, RequestEnvelope,
    ResponseEnvelope, ResponseStatus,
};
pub use errors::{
    ErrorKind, InputError, InvalidMessage, MemoryError, RegistryError, RetryPolicy, StateError,
    StepError, TraceError, TransitionError,
};
pub use identifiers::{AgentId, FieldName, MessageId, StepNumber, WorkflowId};
pub use machine::{BackoffSchedule, RunMachine, RunState, StepMachine, StepState, StepTransition};
pub use memory::{normalize, MemoryRecord, MemoryStore, MemoryUpdate, MEMORY_RECORD_VERSION};
pub use output::{FailureRecord, WorkflowOutput};
pub use registry::{AgentRegistry, RegistryEntry};
pub use request::{WorkflowInput, WorkflowRequest};
pub use state::{fields, SharedState, StateSnapshot};
pub use trace::{StepOutcome, Trace, TraceEntry};
pub use types::{Payload, Platform, SchemaSupport, SchemaVersion, Timestamp, UnknownPlatform};
