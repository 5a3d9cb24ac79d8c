//! Run-level and step-level state machines.
//!
//! Both machines are pure: they decide, the coordinator acts. This keeps retry
//! exhaustion and fail-fast halting testable without any agent.
//!
//! ```text
//! run:   Idle ──start──► Running ──succeed──► Succeeded
//!                           └─────fail──────► Failed
//!
//! step:  Pending ──failure──► Retrying(n) ──failure──► … ──► Failed
//!           └──────success───────┴──────────success────────► Done
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RetryPolicy, StepError, TransitionError};

// ---------------------------------------------------------------------------
// Back-off
// ---------------------------------------------------------------------------

/// Exponential back-off for agent-execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    /// Extra attempts after the first dispatch.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffSchedule {
    /// No waiting between attempts; for tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

// ---------------------------------------------------------------------------
// Run machine
// ---------------------------------------------------------------------------

/// Lifecycle of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    /// `Succeeded` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Enforces the run lifecycle. One machine per run; never reused.
#[derive(Debug)]
pub struct RunMachine {
    state: RunState,
}

impl Default for RunMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// `Idle → Running`, once the input has been admitted.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(RunState::Idle, RunState::Running)
    }

    /// `Running → Succeeded`, after the last step merged.
    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        self.transition(RunState::Running, RunState::Succeeded)
    }

    /// `Running → Failed`, on the first unrecoverable step failure.
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        self.transition(RunState::Running, RunState::Failed)
    }

    /// Returns `true` while steps may still be dispatched.
    pub fn may_dispatch(&self) -> bool {
        self.state == RunState::Running
    }

    fn transition(&mut self, from: RunState, to: RunState) -> Result<(), TransitionError> {
        if self.state != from {
            return Err(TransitionError {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Step machine
// ---------------------------------------------------------------------------

/// Lifecycle of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum StepState {
    Pending,
    Retrying { retry_count: u32 },
    Done,
    Failed,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::Pending => f.write_str("pending"),
            StepState::Retrying { retry_count } => write!(f, "retrying({retry_count})"),
            StepState::Done => f.write_str("done"),
            StepState::Failed => f.write_str("failed"),
        }
    }
}

/// What the coordinator should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTransition {
    /// Re-dispatch with `retry_count` after waiting `after`.
    Retry { retry_count: u32, after: Duration },
    /// The step has failed for good.
    Exhausted,
}

/// Tracks attempts for one step and decides on retries.
///
/// Agent-execution failures draw on the [`BackoffSchedule`] budget;
/// communication failures have their own budget given by the error's
/// [`RetryPolicy`]. Every re-dispatch increments the envelope retry count.
#[derive(Debug)]
pub struct StepMachine {
    state: StepState,
    schedule: BackoffSchedule,
    retries_used: u32,
    backoff_retries: u32,
    bounded_retries: u32,
}

impl StepMachine {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self {
            state: StepState::Pending,
            schedule,
            retries_used: 0,
            backoff_retries: 0,
            bounded_retries: 0,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Retry count to stamp on the next request.
    pub fn retry_count(&self) -> u32 {
        self.retries_used
    }

    /// Marks the step done.
    pub fn on_success(&mut self) -> Result<(), TransitionError> {
        match self.state {
            StepState::Pending | StepState::Retrying { .. } => {
                self.state = StepState::Done;
                Ok(())
            }
            other => Err(TransitionError {
                from: other.to_string(),
                to: StepState::Done.to_string(),
            }),
        }
    }

    /// Records a failed attempt and decides whether to retry.
    pub fn on_failure(&mut self, error: &StepError) -> StepTransition {
        if matches!(self.state, StepState::Done | StepState::Failed) {
            return StepTransition::Exhausted;
        }

        let after = match error.retry_policy() {
            RetryPolicy::NonRetryable => None,
            RetryPolicy::Retryable {
                after,
                max_retries: Some(budget),
            } => (self.bounded_retries < budget).then(|| {
                self.bounded_retries += 1;
                after.unwrap_or(Duration::ZERO)
            }),
            RetryPolicy::Retryable {
                after,
                max_retries: None,
            } => (self.backoff_retries < self.schedule.max_retries).then(|| {
                self.backoff_retries += 1;
                after.unwrap_or_else(|| self.schedule.delay_for(self.backoff_retries))
            }),
        };

        match after {
            Some(after) => {
                self.retries_used += 1;
                self.state = StepState::Retrying {
                    retry_count: self.retries_used,
                };
                StepTransition::Retry {
                    retry_count: self.retries_used,
                    after,
                }
            }
            None => {
                self.state = StepState::Failed;
                StepTransition::Exhausted
            }
        }
    }
}
