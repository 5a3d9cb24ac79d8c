//! The workflow coordinator: drives one run through the resolved agent order.
//!
//! Each run owns its own [`SharedState`], [`Trace`] and [`RunMachine`]; only
//! the registry and the memory store are shared between runs. Steps are
//! strictly sequential. An agent is invoked on a spawned task so that a panic
//! surfaces as a [`StepError::AgentFault`] instead of unwinding through the
//! coordinator, and the await is bounded by the configured step timeout.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    fields, validate_request, validate_response, Agent, AgentId, AgentRegistry, BackoffSchedule,
    ErrorDetail, ExecutionContext, FailureRecord, InvalidMessage, MemoryRecord, MemoryStore,
    MemoryUpdate, Payload, RegistryEntry, RequestEnvelope, ResponseStatus, RunMachine,
    SchemaSupport, SharedState, StepError, StepMachine, StepNumber, StepOutcome, StepTransition,
    Timestamp, Trace, TraceEntry, WorkflowId, WorkflowInput, WorkflowOutput, WorkflowRequest,
};
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn, Span};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for [`WorkflowCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on a single agent invocation.
    pub step_timeout: Duration,

    /// Retry budget and delays for agent-execution failures.
    pub backoff: BackoffSchedule,

    /// A remembered topic counts as recent for this many days.
    pub recent_topic_window_days: u32,

    /// Sender id stamped on every request.
    pub coordinator_id: AgentId,

    /// Envelope versions accepted on agent responses.
    pub schema_support: SchemaSupport,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            backoff: BackoffSchedule::default(),
            recent_topic_window_days: 30,
            coordinator_id: AgentId::coordinator(),
            schema_support: SchemaSupport::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run bookkeeping
// ---------------------------------------------------------------------------

struct Run {
    workflow_id: WorkflowId,
    machine: RunMachine,
    state: SharedState,
    trace: Trace,
    memory: MemoryRecord,
}

impl Run {
    fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            machine: RunMachine::new(),
            state: SharedState::new(),
            trace: Trace::new(),
            memory: MemoryRecord::empty(),
        }
    }

    /// Moves the run to `Failed` and packages what happened.
    fn halt(
        &mut self,
        error: &StepError,
        agent_id: Option<AgentId>,
        step: Option<StepNumber>,
    ) -> FailureRecord {
        if let Err(e) = self.machine.fail() {
            debug!(error = %e, "run was not running when halted");
        }
        error!(
            workflow_id = %self.workflow_id,
            kind = %error.kind(),
            code = error.code(),
            error = %error,
            "workflow halted"
        );
        FailureRecord {
            workflow_id: Some(self.workflow_id),
            timestamp: Timestamp::now(),
            kind: error.kind(),
            agent_id,
            step,
            message: error.to_string(),
            error_detail: Some(ErrorDetail::new(error.code(), error.to_string())),
            run_state: self.machine.state(),
            trace: std::mem::take(&mut self.trace),
        }
    }
}

/// Timing and inputs of the step currently executing.
struct StepContext<'a> {
    step: StepNumber,
    entry: &'a RegistryEntry,
    input: Payload,
    started_at: Timestamp,
}

impl StepContext<'_> {
    fn trace_entry(
        &self,
        status: StepOutcome,
        output: Option<&Payload>,
        retries_used: u32,
        error_detail: Option<ErrorDetail>,
    ) -> TraceEntry {
        let finished_at = Timestamp::now();
        TraceEntry {
            step: self.step,
            agent_id: self.entry.id.clone(),
            started_at: self.started_at,
            finished_at,
            input_summary: self.input.summary(),
            output_summary: output.map_or_else(|| "(none)".to_string(), Payload::summary),
            status,
            elapsed_ms: finished_at.millis_since(self.started_at),
            retries_used,
            error_detail,
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Executes workflow runs against a registry of agents.
pub struct WorkflowCoordinator {
    registry: Arc<AgentRegistry>,
    memory: Arc<dyn MemoryStore>,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    pub fn new(registry: Arc<AgentRegistry>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            registry,
            memory,
            config: CoordinatorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Executes one workflow run end to end.
    ///
    /// Returns the output record once every step has succeeded, or a failure
    /// record describing the first unrecoverable failure. Input that fails
    /// admission is rejected before a run exists: no agent is invoked and the
    /// record's run state is `Idle`.
    #[instrument(skip_all, fields(workflow_id = tracing::field::Empty))]
    pub async fn run(&self, input: &WorkflowInput) -> Result<WorkflowOutput, FailureRecord> {
        let request = WorkflowRequest::admit(input).map_err(|e| {
            warn!(error = %e, "workflow input rejected");
            FailureRecord::input_rejected(&e)
        })?;

        let mut run = Run::new(WorkflowId::new_random());
        Span::current().record("workflow_id", tracing::field::display(run.workflow_id));

        if let Err(e) = run.machine.start() {
            return Err(run.halt(&e.into(), None, None));
        }
        info!(
            idea = request.idea(),
            platforms = ?request.platforms(),
            "workflow started"
        );

        let order = match self.registry.resolve_order() {
            Ok(order) => order,
            Err(e) => return Err(run.halt(&e.into(), None, None)),
        };
        if let Err(e) = run.state.merge(StepNumber::INPUT, &request.to_payload()) {
            return Err(run.halt(&e.into(), None, None));
        }

        run.memory = match self.memory.load().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "memory unavailable; continuing without history");
                MemoryRecord::empty()
            }
        };

        let mut step = StepNumber::FIRST;
        for agent_id in &order {
            if !run.machine.may_dispatch() {
                break;
            }
            self.execute_step(&mut run, step, agent_id).await?;
            step = step.next();
        }

        if let Err(e) = run.machine.succeed() {
            return Err(run.halt(&e.into(), None, None));
        }
        info!(steps = run.trace.len(), "workflow succeeded");
        Ok(WorkflowOutput::from_state(
            run.workflow_id,
            &run.state,
            run.trace,
        ))
    }

    #[instrument(skip_all, fields(step = %step, agent = %agent_id))]
    async fn execute_step(
        &self,
        run: &mut Run,
        step: StepNumber,
        agent_id: &AgentId,
    ) -> Result<(), FailureRecord> {
        let (entry, agent) = match self
            .registry
            .get(agent_id)
            .and_then(|entry| Ok((entry, self.registry.agent(agent_id)?)))
        {
            Ok(found) => found,
            Err(e) => return Err(run.halt(&e.into(), Some(agent_id.clone()), Some(step))),
        };

        let ctx = StepContext {
            step,
            entry,
            input: self.build_payload(entry, run),
            started_at: Timestamp::now(),
        };
        let mut machine = StepMachine::new(self.config.backoff);

        let output = loop {
            let attempt = self
                .attempt(run, &ctx, Arc::clone(&agent), machine.retry_count())
                .await;
            let failure = match attempt {
                Ok(payload) => match machine.on_success() {
                    Ok(()) => break payload,
                    Err(e) => StepError::from(e),
                },
                Err(e) => e,
            };

            match machine.on_failure(&failure) {
                StepTransition::Retry { retry_count, after } => {
                    warn!(
                        kind = %failure.kind(),
                        error = %failure,
                        retry_count,
                        delay_ms = after.as_millis() as u64,
                        "step attempt failed; retrying"
                    );
                    if !after.is_zero() {
                        tokio::time::sleep(after).await;
                    }
                }
                StepTransition::Exhausted => {
                    return Err(self.fail_step(run, &ctx, &failure, machine.retry_count()));
                }
            }
        };

        // Only declared outputs reach the shared state.
        let mut merged = Payload::new();
        for field in &entry.produces {
            if let Some(value) = output.get(field.as_str()) {
                merged.insert(field, value.clone());
            }
        }
        if let Err(e) = run.state.merge(step, &merged) {
            return Err(self.fail_step(run, &ctx, &e.into(), machine.retry_count()));
        }

        let trace_entry =
            ctx.trace_entry(StepOutcome::Succeeded, Some(&merged), machine.retry_count(), None);
        if let Err(e) = run.trace.record(trace_entry) {
            return Err(run.halt(&e.into(), Some(agent_id.clone()), Some(step)));
        }
        info!(
            retries_used = machine.retry_count(),
            output = %merged.summary(),
            "step succeeded"
        );

        self.remember(&merged).await;
        Ok(())
    }

    /// One dispatch: build and validate the request, invoke the agent under
    /// the step timeout, and validate what comes back.
    async fn attempt(
        &self,
        run: &Run,
        ctx: &StepContext<'_>,
        agent: Arc<dyn Agent>,
        retry_count: u32,
    ) -> Result<Payload, StepError> {
        let agent_id = ctx.entry.id.clone();
        let request = RequestEnvelope::new(
            self.config.coordinator_id.clone(),
            agent_id.clone(),
            ExecutionContext {
                workflow_id: run.workflow_id,
                step_number: ctx.step,
                state_snapshot: run.state.snapshot(),
                retry_count,
            },
            ctx.input.clone(),
        );
        validate_request(&request, &ctx.entry.input_schema).map_err(|source| {
            StepError::InvalidRequest {
                agent: agent_id.clone(),
                source,
            }
        })?;
        debug!(message_id = %request.message_id(), retry_count, "dispatching request");

        let handle = tokio::spawn({
            let request = request.clone();
            async move { agent.process(request).await }
        });
        let abort = handle.abort_handle();
        let response = match tokio::time::timeout(self.config.step_timeout, handle).await {
            Ok(Ok(response)) => response,
            Ok(Err(join_error)) => {
                return Err(StepError::AgentFault {
                    agent: agent_id,
                    message: fault_message(join_error),
                })
            }
            Err(_) => {
                abort.abort();
                return Err(StepError::Timeout {
                    agent: agent_id,
                    after: self.config.step_timeout,
                });
            }
        };

        validate_response(
            &response,
            &request,
            &self.config.schema_support,
            &ctx.entry.produces,
        )
        .map_err(|source| StepError::InvalidResponse {
            agent: agent_id.clone(),
            source,
        })?;
        if response.schema_version() != &ctx.entry.output_schema {
            return Err(StepError::InvalidResponse {
                agent: agent_id,
                source: InvalidMessage::Inconsistent(format!(
                    "answered with schema '{}' but declares '{}'",
                    response.schema_version().as_str(),
                    ctx.entry.output_schema.as_str()
                )),
            });
        }

        match response.status() {
            ResponseStatus::Success => Ok(response.into_payload()),
            ResponseStatus::Error | ResponseStatus::Partial => {
                let (code, message) = response
                    .error_detail()
                    .map(|d| (d.code.clone(), d.message.clone()))
                    .unwrap_or_else(|| ("unknown".to_string(), String::new()));
                Err(StepError::AgentReported {
                    agent: agent_id,
                    code,
                    message,
                })
            }
        }
    }

    /// Records the failing step once and halts the run.
    fn fail_step(
        &self,
        run: &mut Run,
        ctx: &StepContext<'_>,
        failure: &StepError,
        retries_used: u32,
    ) -> FailureRecord {
        let detail = ErrorDetail::new(failure.code(), failure.to_string());
        let entry = ctx.trace_entry(StepOutcome::Failed, None, retries_used, Some(detail));
        if let Err(e) = run.trace.record(entry) {
            error!(error = %e, "could not record failed step");
        }
        run.halt(failure, Some(ctx.entry.id.clone()), Some(ctx.step))
    }

    /// The request payload: declared inputs from the shared state, with the
    /// memory-derived fields filled from the run's memory snapshot.
    fn build_payload(&self, entry: &RegistryEntry, run: &Run) -> Payload {
        let now = Timestamp::now();
        let mut payload = Payload::new();
        for field in &entry.consumes {
            let name = field.as_str();
            let value = match name {
                fields::PAST_TOPICS => Some(serde_json::json!(run.memory.past_topics())),
                fields::PAST_HOOKS => Some(serde_json::json!(run.memory.past_hooks())),
                fields::RECENT_TOPICS => Some(serde_json::json!(run
                    .memory
                    .recent_topics(self.config.recent_topic_window_days, now))),
                _ => run.state.get(name).cloned(),
            };
            match value {
                Some(value) => payload.insert(field, value),
                None => debug!(field = name, "declared input not yet in state"),
            }
        }
        payload
    }

    /// Persists the step's topic and hook, if any. Failures are logged only.
    async fn remember(&self, merged: &Payload) {
        let mut update = MemoryUpdate::new(Timestamp::now());
        if let Some(topic) = merged.get_str(fields::TOPIC) {
            update = update.with_topic(topic);
        }
        if let Some(hook) = merged.get_str(fields::HOOK) {
            update = update.with_hook(hook);
        }
        if update.is_empty() {
            return;
        }
        match self.memory.persist(&update).await {
            Ok(record) => debug!(
                topics = record.past_topics().len(),
                hooks = record.past_hooks().len(),
                "memory updated"
            ),
            Err(e) => warn!(error = %e, "memory update failed; run continues"),
        }
    }
}

fn fault_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "agent task was cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(panic) => panic_text(panic.as_ref()),
        Err(other) => other.to_string(),
    }
}

fn panic_text(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
