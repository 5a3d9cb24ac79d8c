//! Boundary records handed to presentation layers at the end of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::fields;
use crate::{
    AgentId, ErrorDetail, ErrorKind, InputError, RunState, SharedState, StepNumber, Timestamp,
    Trace, TraceEntry, WorkflowId,
};

// ---------------------------------------------------------------------------
// Success
// ---------------------------------------------------------------------------

/// Result of a run that reached `Succeeded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub workflow_id: WorkflowId,
    pub timestamp: Timestamp,
    /// Long-form content from the writing step.
    pub core_content: Value,
    /// Per-platform adaptations keyed by platform name.
    pub adaptations: BTreeMap<String, Value>,
    /// Publication schedule in slot order.
    pub schedule: Vec<Value>,
    pub trace: Trace,
}

impl WorkflowOutput {
    /// Projects the final shared state onto the output record. Fields that
    /// were never produced project to empty values.
    pub fn from_state(workflow_id: WorkflowId, state: &SharedState, trace: Trace) -> Self {
        let core_content = state.get(fields::CORE_CONTENT).cloned().unwrap_or(Value::Null);
        let adaptations = state
            .get(fields::ADAPTATIONS)
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let schedule = state
            .get(fields::SCHEDULE)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            workflow_id,
            timestamp: Timestamp::now(),
            core_content,
            adaptations,
            schedule,
            trace,
        }
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// Structured description of a run that did not succeed.
///
/// `trace` holds every step that ran, the failing step included (recorded once,
/// with its retry count). Input rejections carry an empty trace and no
/// workflow id, since no run was ever started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub workflow_id: Option<WorkflowId>,
    pub timestamp: Timestamp,
    pub kind: ErrorKind,
    pub agent_id: Option<AgentId>,
    pub step: Option<StepNumber>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    pub run_state: RunState,
    pub trace: Trace,
}

impl FailureRecord {
    /// Failure record for input that was refused admission.
    pub fn input_rejected(error: &InputError) -> Self {
        Self {
            workflow_id: None,
            timestamp: Timestamp::now(),
            kind: ErrorKind::InputValidation,
            agent_id: None,
            step: None,
            message: error.to_string(),
            error_detail: None,
            run_state: RunState::Idle,
            trace: Trace::new(),
        }
    }

    /// Trace entries for the steps that completed before the failure.
    pub fn completed_steps(&self) -> Vec<&TraceEntry> {
        self.trace.succeeded().collect()
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.agent_id, self.step) {
            (Some(agent), Some(step)) => write!(
                f,
                "{} failure at step {step} ({agent}): {}",
                self.kind, self.message
            ),
            _ => write!(f, "{} failure: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FailureRecord {}
