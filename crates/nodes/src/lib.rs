//! Cadence agents and workflow coordinator.
//!
//! This crate provides the four default content agents (ideation, writer,
//! adapter, scheduler) and the [`WorkflowCoordinator`] that drives the
//! step loop: request construction, bounded dispatch, retries with back-off,
//! state merge, trace recording and best-effort memory persistence.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The coordinator sequences calls between the domain
//! rules in the [`pipeline`] crate and the [`pipeline::MemoryStore`] port. It
//! owns no persistence of its own.
//!
//! ## Extending
//!
//! New agents implement [`pipeline::Agent`] and are registered alongside the
//! defaults with a [`pipeline::RegistryEntry`] declaring their dependencies and
//! contract. The coordinator picks them up from the resolved order without
//! modification.

pub mod agents;
pub mod coordinator;

pub use agents::default_registry;
pub use coordinator::{CoordinatorConfig, WorkflowCoordinator};
