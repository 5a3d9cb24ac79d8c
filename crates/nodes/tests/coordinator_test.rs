use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodes::agents::{ADAPTER, IDEATION, SCHEDULER, WRITER};
use nodes::{default_registry, CoordinatorConfig, WorkflowCoordinator};
use pipeline::{
    fields, Agent, AgentId, AgentRegistry, BackoffSchedule, ErrorDetail, ErrorKind, MemoryError,
    MemoryRecord, MemoryStore, MemoryUpdate, Payload, RegistryEntry, RequestEnvelope,
    ResponseEnvelope, RunState, SchemaSupport, SchemaVersion, StepNumber, StepOutcome,
    WorkflowInput,
};
use serde_json::{json, Value};
use storage::InMemoryMemoryStore;

// ---------------------------------------------------------------------------
// Scripted agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    FailTimes(u32),
    AlwaysFail,
    Sleep(Duration),
    Panic,
    OmitOutput,
    Partial,
    AnswerSchema(&'static str),
}

struct Scripted {
    behavior: Behavior,
    output: Payload,
    calls: AtomicU32,
    requests: Mutex<Vec<RequestEnvelope>>,
}

impl Scripted {
    fn new(behavior: Behavior, output: Payload) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            output,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<RequestEnvelope> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for Scripted {
    async fn process(&self, request: RequestEnvelope) -> ResponseEnvelope {
        self.requests.lock().unwrap().push(request.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior {
            Behavior::Succeed => ResponseEnvelope::success(&request, self.output.clone()),
            Behavior::FailTimes(n) if call <= n => ResponseEnvelope::failure(
                &request,
                ErrorDetail::new("transient", "upstream hiccup"),
            ),
            Behavior::FailTimes(_) => ResponseEnvelope::success(&request, self.output.clone()),
            Behavior::AlwaysFail => {
                ResponseEnvelope::failure(&request, ErrorDetail::new("broken", "always fails"))
            }
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                ResponseEnvelope::success(&request, self.output.clone())
            }
            Behavior::Panic => panic!("scripted panic"),
            Behavior::OmitOutput => {
                ResponseEnvelope::success(&request, Payload::new().with("unrelated", json!(1)))
            }
            Behavior::Partial => ResponseEnvelope::partial(
                &request,
                self.output.clone(),
                ErrorDetail::new("incomplete", "only half done"),
            ),
            Behavior::AnswerSchema(tag) => {
                ResponseEnvelope::success(&request, self.output.clone())
                    .with_schema_version(SchemaVersion::new(tag).unwrap())
            }
        }
    }
}

fn id(name: &str) -> AgentId {
    AgentId::new(name).unwrap()
}

fn out_field(i: usize) -> String {
    format!("out_{i}")
}

/// A linear chain `a1 → a2 → …` where `ai` produces `out_i` and consumes the
/// idea plus its predecessor's output.
struct Chain {
    agents: Vec<Arc<Scripted>>,
    registry: AgentRegistry,
}

fn chain(behaviors: &[Behavior]) -> Chain {
    chain_with(behaviors, |_, entry| entry)
}

fn chain_with(
    behaviors: &[Behavior],
    customize: impl Fn(usize, RegistryEntry) -> RegistryEntry,
) -> Chain {
    let mut registry = AgentRegistry::new();
    let mut agents = Vec::new();
    for (index, behavior) in behaviors.iter().enumerate() {
        let i = index + 1;
        let field = out_field(i);
        let mut entry = RegistryEntry::new(id(&format!("a{i}"))).produces(&[field.as_str()]);
        entry = entry.consumes(&[fields::CONTENT_IDEA]);
        if i > 1 {
            let previous = out_field(i - 1);
            entry = entry
                .depends_on(id(&format!("a{}", i - 1)))
                .consumes(&[previous.as_str()]);
        }
        let entry = customize(i, entry);
        let agent = Scripted::new(*behavior, Payload::new().with(&field, json!(format!("v{i}"))));
        registry.register(entry, agent.clone()).unwrap();
        agents.push(agent);
    }
    Chain { agents, registry }
}

fn coordinator(registry: AgentRegistry, memory: Arc<dyn MemoryStore>) -> WorkflowCoordinator {
    WorkflowCoordinator::new(Arc::new(registry), memory).with_config(CoordinatorConfig {
        step_timeout: Duration::from_secs(5),
        backoff: BackoffSchedule::immediate(2),
        ..CoordinatorConfig::default()
    })
}

fn input() -> WorkflowInput {
    WorkflowInput::new(
        "benefits of async logging",
        ["LinkedIn", "Twitter"],
        None,
    )
}

struct BrokenStore;

#[async_trait]
impl MemoryStore for BrokenStore {
    async fn load(&self) -> Result<MemoryRecord, MemoryError> {
        Err(MemoryError::Corrupt("unexpected end of input".to_string()))
    }

    async fn persist(&self, _update: &MemoryUpdate) -> Result<MemoryRecord, MemoryError> {
        Err(MemoryError::Io("read-only filesystem".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Default agents end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn default_agents_produce_complete_output() {
    let store = Arc::new(InMemoryMemoryStore::new());
    let coordinator = coordinator(default_registry().unwrap(), store.clone());

    let output = coordinator.run(&input()).await.unwrap();

    assert!(output.core_content.get("title").and_then(Value::as_str).is_some());
    assert!(output.core_content.get("wordCount").and_then(Value::as_u64).unwrap() > 0);
    assert_eq!(
        output.adaptations.keys().map(String::as_str).collect::<Vec<_>>(),
        ["LinkedIn", "Twitter"]
    );
    let twitter_chars = output.adaptations["Twitter"]["char_count"].as_u64().unwrap();
    assert!(twitter_chars <= 280);

    let scheduled: Vec<&str> = output
        .schedule
        .iter()
        .filter_map(|e| e["platform"].as_str())
        .collect();
    assert!(scheduled.contains(&"LinkedIn"));
    assert!(scheduled.contains(&"Twitter"));

    let agents: Vec<&str> = output
        .trace
        .agent_ids()
        .into_iter()
        .map(AgentId::as_str)
        .collect();
    assert_eq!(agents, [IDEATION, WRITER, ADAPTER, SCHEDULER]);
    for (i, entry) in output.trace.entries().iter().enumerate() {
        assert_eq!(entry.step, StepNumber::new(i as u32 + 1));
        assert_eq!(entry.status, StepOutcome::Succeeded);
        assert_eq!(entry.retries_used, 0);
    }
}

#[tokio::test]
async fn identical_input_yields_identical_structure() {
    let first = coordinator(default_registry().unwrap(), Arc::new(InMemoryMemoryStore::new()))
        .run(&input())
        .await
        .unwrap();
    let second = coordinator(default_registry().unwrap(), Arc::new(InMemoryMemoryStore::new()))
        .run(&input())
        .await
        .unwrap();

    assert_ne!(first.workflow_id, second.workflow_id);
    assert_eq!(first.core_content, second.core_content);
    assert_eq!(first.adaptations, second.adaptations);
    assert_eq!(first.schedule, second.schedule);
}

#[tokio::test]
async fn successful_run_updates_memory() {
    let store = Arc::new(InMemoryMemoryStore::new());
    let coordinator = coordinator(default_registry().unwrap(), store.clone());

    coordinator.run(&input()).await.unwrap();
    let after_first = store.snapshot().await;
    assert_eq!(after_first.past_topics().len(), 1);
    assert_eq!(after_first.past_hooks().len(), 1);

    coordinator.run(&input()).await.unwrap();
    let after_second = store.snapshot().await;
    assert_eq!(after_second.past_topics().len(), 1, "topic upsert is idempotent");
    assert_eq!(after_second.past_hooks().len(), 2, "remembered hook is not reused");
}

#[tokio::test]
async fn longest_idea_still_fits_every_platform() {
    let idea = "how structured async logging changes incident response ".repeat(9);
    let idea = idea.trim_end();
    assert!(idea.chars().count() <= 500);
    let store = Arc::new(InMemoryMemoryStore::new());
    let coordinator = coordinator(default_registry().unwrap(), store);

    let sets = [
        ["Twitter", "Threads", "Instagram"],
        ["LinkedIn", "Facebook", "Twitter"],
    ];
    for platforms in sets {
        let output = coordinator
            .run(&WorkflowInput::new(idea, platforms, None))
            .await
            .unwrap();
        for (platform, limit) in [
            ("Twitter", 280),
            ("Threads", 500),
            ("Instagram", 2200),
            ("LinkedIn", 3000),
            ("Facebook", 5000),
        ] {
            if let Some(adaptation) = output.adaptations.get(platform) {
                let chars = adaptation["char_count"].as_u64().unwrap();
                assert!(chars <= limit, "{platform} adaptation is {chars} chars");
            }
        }
    }
}

#[tokio::test]
async fn unavailable_memory_does_not_fail_the_run() {
    let coordinator = coordinator(default_registry().unwrap(), Arc::new(BrokenStore));

    let output = coordinator.run(&input()).await.unwrap();
    assert_eq!(output.trace.len(), 4);
}

// ---------------------------------------------------------------------------
// Input admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_input_invokes_no_agent() {
    let chain = chain(&[Behavior::Succeed, Behavior::Succeed]);
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let empty = WorkflowInput::new("", ["LinkedIn", "Twitter"], None);
    let too_many = WorkflowInput::new(
        "benefits of async logging",
        ["LinkedIn", "Twitter", "Instagram", "Facebook"],
        None,
    );
    for bad in [empty, too_many] {
        let failure = coordinator.run(&bad).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InputValidation);
        assert_eq!(failure.run_state, RunState::Idle);
        assert!(failure.workflow_id.is_none());
        assert!(failure.trace.is_empty());
    }
    assert!(chain.agents.iter().all(|a| a.calls() == 0));
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_step_halts_the_run() {
    let chain = chain(&[
        Behavior::Succeed,
        Behavior::Succeed,
        Behavior::AlwaysFail,
        Behavior::Succeed,
    ]);
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    assert_eq!(failure.run_state, RunState::Failed);
    assert_eq!(failure.agent_id, Some(id("a3")));
    assert_eq!(failure.step, Some(StepNumber::new(3)));
    assert_eq!(failure.error_detail.as_ref().unwrap().code, "broken");

    assert_eq!(agents[2].calls(), 3, "first attempt plus two retries");
    assert_eq!(agents[3].calls(), 0, "no step runs after a halt");

    assert_eq!(failure.trace.len(), 3);
    assert_eq!(failure.completed_steps().len(), 2);
    let failed = &failure.trace.entries()[2];
    assert_eq!(failed.status, StepOutcome::Failed);
    assert_eq!(failed.retries_used, 2);
}

#[tokio::test]
async fn transient_failure_recovers_with_fresh_message_ids() {
    let chain = chain(&[Behavior::Succeed, Behavior::FailTimes(1), Behavior::Succeed]);
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let output = coordinator.run(&input()).await.unwrap();

    assert_eq!(output.trace.len(), 3);
    assert_eq!(output.trace.entries()[1].retries_used, 1);

    let requests = agents[1].requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].message_id(), requests[1].message_id());
    assert_eq!(requests[0].execution_context().retry_count, 0);
    assert_eq!(requests[1].execution_context().retry_count, 1);
    assert_eq!(requests[0].payload(), requests[1].payload());
}

#[tokio::test]
async fn slow_agent_times_out() {
    let chain = chain(&[Behavior::Sleep(Duration::from_secs(2)), Behavior::Succeed]);
    let agents = chain.agents.clone();
    let coordinator = WorkflowCoordinator::new(
        Arc::new(chain.registry),
        Arc::new(InMemoryMemoryStore::new()),
    )
    .with_config(CoordinatorConfig {
        step_timeout: Duration::from_millis(50),
        backoff: BackoffSchedule::immediate(1),
        ..CoordinatorConfig::default()
    });

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    assert_eq!(failure.error_detail.unwrap().code, "timeout");
    assert_eq!(agents[0].calls(), 2);
    assert_eq!(agents[1].calls(), 0);
}

#[tokio::test]
async fn panicking_agent_is_contained() {
    let chain = chain(&[Behavior::Succeed, Behavior::Panic, Behavior::Succeed]);
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    let detail = failure.error_detail.unwrap();
    assert_eq!(detail.code, "agent_fault");
    assert!(detail.message.contains("scripted panic"));
    assert_eq!(agents[2].calls(), 0);
}

#[tokio::test]
async fn missing_declared_output_is_a_contract_violation() {
    let chain = chain(&[Behavior::Succeed, Behavior::OmitOutput]);
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    assert_eq!(failure.error_detail.as_ref().unwrap().code, "invalid_response");
    assert_eq!(failure.completed_steps().len(), 1);
}

#[tokio::test]
async fn partial_response_is_retried_and_never_merged() {
    let chain = chain(&[Behavior::Succeed, Behavior::Partial, Behavior::Succeed]);
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    assert_eq!(failure.run_state, RunState::Failed);
    assert_eq!(failure.step, Some(StepNumber::new(2)));
    assert_eq!(failure.error_detail.as_ref().unwrap().code, "incomplete");

    let requests = agents[1].requests();
    assert_eq!(requests.len(), 3, "first attempt plus two retries");
    for request in &requests {
        assert!(request.execution_context().state_snapshot.contains("out_1"));
        assert!(!request.execution_context().state_snapshot.contains("out_2"));
    }
    assert_eq!(agents[2].calls(), 0);
    assert_eq!(failure.completed_steps().len(), 1);
    assert_eq!(failure.trace.entries()[1].status, StepOutcome::Failed);
}

fn accepting_v2(registry: AgentRegistry) -> WorkflowCoordinator {
    WorkflowCoordinator::new(Arc::new(registry), Arc::new(InMemoryMemoryStore::new())).with_config(
        CoordinatorConfig {
            step_timeout: Duration::from_secs(5),
            backoff: BackoffSchedule::immediate(2),
            schema_support: SchemaSupport::current_only()
                .with_compatible(SchemaVersion::new("v2").unwrap()),
            ..CoordinatorConfig::default()
        },
    )
}

#[tokio::test]
async fn response_must_use_the_declared_output_schema() {
    let chain = chain(&[Behavior::AnswerSchema("v2"), Behavior::Succeed]);
    let agents = chain.agents.clone();

    let failure = accepting_v2(chain.registry).run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::AgentExecution);
    let detail = failure.error_detail.as_ref().unwrap();
    assert_eq!(detail.code, "invalid_response");
    assert!(detail.message.contains("v2"));
    assert_eq!(agents[0].calls(), 3);
    assert_eq!(agents[1].calls(), 0);
}

#[tokio::test]
async fn declared_compatible_output_schema_is_accepted() {
    let v2 = SchemaVersion::new("v2").unwrap();
    let chain = chain_with(&[Behavior::AnswerSchema("v2"), Behavior::Succeed], |i, entry| {
        if i == 1 {
            entry.with_output_schema(v2.clone())
        } else {
            entry
        }
    });

    let output = accepting_v2(chain.registry).run(&input()).await.unwrap();

    assert_eq!(output.trace.len(), 2);
    assert_eq!(output.trace.entries()[0].retries_used, 0);
}

#[tokio::test]
async fn merge_conflict_is_fatal_and_not_retried() {
    let first = Scripted::new(Behavior::Succeed, Payload::new().with("out_1", json!("v1")));
    let second = Scripted::new(Behavior::Succeed, Payload::new().with("out_1", json!("again")));
    let mut registry = AgentRegistry::new();
    registry
        .register(
            RegistryEntry::new(id("a1"))
                .consumes(&[fields::CONTENT_IDEA])
                .produces(&["out_1"]),
            first.clone(),
        )
        .unwrap();
    registry
        .register(
            RegistryEntry::new(id("a2"))
                .depends_on(id("a1"))
                .consumes(&[fields::CONTENT_IDEA])
                .produces(&["out_1"]),
            second.clone(),
        )
        .unwrap();
    let coordinator = coordinator(registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::StateManagement);
    assert_eq!(failure.error_detail.as_ref().unwrap().code, "state_conflict");
    assert_eq!(failure.step, Some(StepNumber::new(2)));
    assert_eq!(second.calls(), 1);
    assert_eq!(failure.trace.len(), 2);
    assert_eq!(failure.trace.entries()[1].status, StepOutcome::Failed);
    assert_eq!(failure.trace.entries()[1].retries_used, 0);
}

#[tokio::test]
async fn unsupported_request_schema_is_a_communication_failure() {
    let chain = chain_with(&[Behavior::Succeed], |_, entry| {
        entry.with_input_schema(SchemaSupport {
            current: SchemaVersion::new("v2").unwrap(),
            compatible: Vec::new(),
        })
    });
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let failure = coordinator.run(&input()).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Communication);
    assert_eq!(failure.error_detail.as_ref().unwrap().code, "invalid_request");
    assert_eq!(failure.trace.entries()[0].retries_used, 1, "one rebuild");
    assert_eq!(agents[0].calls(), 0);
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_carry_context_and_declared_inputs() {
    let chain = chain(&[Behavior::Succeed, Behavior::Succeed, Behavior::Succeed]);
    let agents = chain.agents.clone();
    let coordinator = coordinator(chain.registry, Arc::new(InMemoryMemoryStore::new()));

    let output = coordinator.run(&input()).await.unwrap();

    let request = &agents[1].requests()[0];
    assert_eq!(request.sender_id().as_str(), AgentId::COORDINATOR);
    assert_eq!(request.recipient_id(), &id("a2"));

    let context = request.execution_context();
    assert_eq!(context.workflow_id, output.workflow_id);
    assert_eq!(context.step_number, StepNumber::new(2));
    assert!(context.state_snapshot.contains(fields::CONTENT_IDEA));
    assert!(context.state_snapshot.contains("out_1"));
    assert!(!context.state_snapshot.contains("out_2"));

    let payload = request.payload();
    assert_eq!(payload.get_str("out_1"), Some("v1"));
    assert!(payload.get(fields::PLATFORMS).is_none(), "undeclared inputs are not sent");
}
