//! Execution trace: one audit entry per executed step.
//!
//! A step appears exactly once whatever the number of attempts it took;
//! `retries_used` records how many re-dispatches it consumed. A step that
//! failed terminally is recorded with [`StepOutcome::Failed`] and ends the
//! trace.

use serde::{Deserialize, Serialize};

use crate::{AgentId, ErrorDetail, StepNumber, Timestamp, TraceError};

/// Final outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// Audit record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub step: StepNumber,
    pub agent_id: AgentId,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub input_summary: String,
    pub output_summary: String,
    pub status: StepOutcome,
    pub elapsed_ms: u64,
    pub retries_used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

/// Ordered, gap-free list of [`TraceEntry`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(Vec<TraceEntry>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Its step must directly follow the last recorded one.
    pub fn record(&mut self, entry: TraceEntry) -> Result<(), TraceError> {
        let expected = self.next_step();
        if entry.step != expected {
            return Err(TraceError::OutOfOrder {
                expected,
                got: entry.step,
            });
        }
        self.0.push(entry);
        Ok(())
    }

    /// Step number the next entry must carry.
    pub fn next_step(&self) -> StepNumber {
        self.0
            .last()
            .map(|e| e.step.next())
            .unwrap_or(StepNumber::FIRST)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Agent ids in execution order.
    pub fn agent_ids(&self) -> Vec<&AgentId> {
        self.0.iter().map(|e| &e.agent_id).collect()
    }

    /// Entries for steps that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &TraceEntry> {
        self.0.iter().filter(|e| e.status == StepOutcome::Succeeded)
    }
}
