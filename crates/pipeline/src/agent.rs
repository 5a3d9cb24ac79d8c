//! The agent plug-in contract.
//!
//! Every workflow step is served by one [`Agent`]. The coordinator awaits each
//! call before doing anything else, so from its point of view `process` is a
//! blocking call bounded by the step timeout.
//!
//! ## Contract
//!
//! - No state between invocations. Everything an agent may read is in the
//!   request payload and the execution-context snapshot.
//! - Deterministic on structural fields: two requests with identical payloads
//!   yield responses that agree on theme, sections, adaptation set and
//!   schedule order, even if wording differs.
//! - Failure is an `error` (or `partial`) response built with
//!   [`ResponseEnvelope::failure`]. An agent that panics anyway is contained
//!   by the coordinator and treated as an error response.

use async_trait::async_trait;

use crate::{RequestEnvelope, ResponseEnvelope};

/// A stateless processing unit serving one workflow step.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Handles one request and answers it.
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope;
}
