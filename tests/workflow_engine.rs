//! Workflow Engine Integration Tests
//!
//! End-to-end runs through the default team plus scripted agents for
//! retry, fail-fast, optional steps, cancellation and concurrency.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Barrier;

use devcrew::agents::{
    Agent, AgentConfig, AgentCore, AgentError, AgentRegistry, Capability, Role, StepOutput,
};
use devcrew::codegen::CodeGenerator;
use devcrew::core::{
    EngineOptions, EventStore, RetryPolicy, WorkflowEngine, WorkflowSpec, WorkflowStep,
};
use devcrew::domain::{
    Artifact, ArtifactKind, EventType, Language, ProjectContext, ProjectMetadata, RunState,
    StepView, TaskStatus,
};
use devcrew::error::ErrorKind;

type Behaviour = Box<dyn Fn(u32, &StepView) -> Result<StepOutput, AgentError> + Send + Sync>;

/// Agent whose every capability call runs a closure and is counted
struct ScriptedAgent {
    core: AgentCore,
    capabilities: &'static [Capability],
    calls: Arc<AtomicU32>,
    behaviour: Behaviour,
}

impl ScriptedAgent {
    fn new(
        role: Role,
        capabilities: &'static [Capability],
        calls: Arc<AtomicU32>,
        behaviour: impl Fn(u32, &StepView) -> Result<StepOutput, AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            core: AgentCore::new(role, AgentConfig::default()),
            capabilities,
            calls,
            behaviour: Box::new(behaviour),
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        self.capabilities
    }

    async fn perform(
        &mut self,
        _capability: Capability,
        view: &StepView,
    ) -> Result<StepOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.behaviour)(call, view)
    }
}

/// Agent that only returns once a peer has reached the same barrier
struct BarrierAgent {
    core: AgentCore,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl Agent for BarrierAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ReviewCode, Capability::ProduceDocumentation]
    }

    async fn perform(
        &mut self,
        _capability: Capability,
        _view: &StepView,
    ) -> Result<StepOutput, AgentError> {
        self.barrier.wait().await;
        Ok(StepOutput::new(json!(self.core.role.as_str())))
    }
}

fn default_team() -> AgentRegistry {
    AgentRegistry::default_team(Arc::new(CodeGenerator::with_builtins()))
}

fn context(root: &TempDir) -> ProjectContext {
    ProjectContext::new(ProjectMetadata::default(), root.path())
}

fn spec(name: &str, steps: Vec<WorkflowStep>) -> WorkflowSpec {
    let mut spec = WorkflowSpec::from_yaml(&format!("name: {}\nsteps: []\n", name)).unwrap();
    spec.steps = steps;
    spec
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

const FACTORIAL_WORKFLOW: &str = r#"
name: factorial
description: Analyze, generate and write a factorial function
project:
  name: Factorial
steps:
  - id: analyze
    agent: architect
    params:
      text: Create a factorial function
    outputs: [requirements]
  - id: generate_code
    agent: developer
    inputs: [requirements]
    outputs: [code]
  - id: write_code
    agent: developer
    action: write_code
    inputs: [code]
    params:
      path: factorial.py
    outputs: [written]
"#;

#[tokio::test]
async fn test_factorial_workflow_writes_file() {
    let temp = TempDir::new().unwrap();
    let spec = WorkflowSpec::from_yaml(FACTORIAL_WORKFLOW).unwrap();

    let report = WorkflowEngine::new(default_team())
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert!(report.is_completed(), "run failed: {:?}", report.failure());
    for step in ["analyze", "generate_code", "write_code"] {
        assert_eq!(report.task_status(step), Some(TaskStatus::Done));
        assert_eq!(report.attempts(step), 1);
    }

    let written = std::fs::read_to_string(temp.path().join("factorial.py")).unwrap();
    assert!(written.contains("def factorial(n: int) -> int:"));
    assert!(written.contains("for i in range(2, n + 1):"));
    assert!(written.contains("result *= i"));

    // The generated module is also tracked as an artifact
    assert!(report.context.artifact("factorial").is_some());
    assert_eq!(report.context.project.name, "Factorial");
    assert!(report
        .context
        .messages()
        .iter()
        .any(|m| m.sender == Role::Architect));
}

#[tokio::test]
async fn test_missing_input_fails_before_any_agent_runs() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |_, _| Ok(StepOutput::new(json!("code"))),
    )));

    let spec = spec(
        "missing",
        vec![
            WorkflowStep::new("generate", Role::Developer).writes("code"),
            WorkflowStep::new("implement", Role::Developer)
                .reads("design")
                .writes("module"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let (step_id, kind, error) = report.failure().unwrap();
    assert_eq!(step_id, Some("implement"));
    assert_eq!(kind, ErrorKind::MissingInput);
    assert!(error.contains("design"));
    assert_eq!(report.task_status("generate"), Some(TaskStatus::Pending));
    assert_eq!(report.task_status("implement"), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn test_unknown_agent_fails_without_retry() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |_, _| Ok(StepOutput::new(json!("code"))),
    )));

    let spec = spec(
        "unknown",
        vec![
            WorkflowStep::new("generate", Role::Developer).writes("code"),
            WorkflowStep::new("review", Role::Qa).reads("code"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    let (step_id, kind, _) = report.failure().unwrap();
    assert_eq!(step_id, Some("review"));
    assert_eq!(kind, ErrorKind::UnknownAgent);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.attempts("review"), 0);
}

#[tokio::test]
async fn test_unsupported_action_is_rejected() {
    let temp = TempDir::new().unwrap();
    let spec = spec(
        "unsupported",
        vec![WorkflowStep::new("write", Role::Architect)
            .with_action(Capability::WriteCode)
            .with_param("path", "a.py")
            .with_param("code", "x = 1\n")],
    );

    let report = WorkflowEngine::new(default_team())
        .run(&spec, context(&temp))
        .await
        .unwrap();

    let (_, kind, _) = report.failure().unwrap();
    assert_eq!(kind, ErrorKind::UnsupportedCapability);
    assert!(!temp.path().join("a.py").exists());
}

#[tokio::test]
async fn test_retry_bounds_attempts() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |call, _| Err(AgentError::Failed(format!("transient failure {}", call))),
    )));

    let policy = RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 1,
        ..Default::default()
    };
    let spec = spec(
        "flaky",
        vec![
            WorkflowStep::new("generate", Role::Developer)
                .writes("code")
                .with_retry_policy(policy),
            WorkflowStep::new("again", Role::Developer).reads("code"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.attempts("generate"), 3);
    assert_eq!(report.task_status("generate"), Some(TaskStatus::Failed));
    assert_eq!(report.task_status("again"), Some(TaskStatus::Pending));

    let (step_id, kind, error) = report.failure().unwrap();
    assert_eq!(step_id, Some("generate"));
    assert_eq!(kind, ErrorKind::AgentFailed);
    assert!(error.contains("transient failure 3"));
}

#[tokio::test]
async fn test_retry_recovers_transient_failure() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |call, _| {
            if call == 1 {
                Err(AgentError::Failed("warming up".to_string()))
            } else {
                Ok(StepOutput::new(json!("print('ok')")))
            }
        },
    )));

    // Default policy: one retry, no delay
    let spec = spec(
        "recover",
        vec![WorkflowStep::new("generate", Role::Developer).writes("code")],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.attempts("generate"), 2);
    assert_eq!(report.context.value("code"), Some(&json!("print('ok')")));
}

#[tokio::test]
async fn test_configuration_errors_are_not_retried() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |_, _| Err(AgentError::InvalidInput("no task".to_string())),
    )));

    let spec = spec(
        "invalid",
        vec![WorkflowStep::new("generate", Role::Developer)
            .writes("code")
            .with_retry_policy(RetryPolicy {
                max_retries: 5,
                ..Default::default()
            })],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.failure().unwrap().1, ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_optional_step_failure_does_not_halt() {
    let temp = TempDir::new().unwrap();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Qa,
        &[Capability::ReviewCode],
        counter(),
        |_, _| Err(AgentError::InvalidInput("nothing to review".to_string())),
    )));
    registry.register(Box::new(ScriptedAgent::new(
        Role::TechnicalWriter,
        &[Capability::ProduceDocumentation],
        counter(),
        |_, _| Ok(StepOutput::new(json!("# Docs"))),
    )));

    let spec = spec(
        "optional",
        vec![
            WorkflowStep::new("review", Role::Qa).writes("review").optional(),
            WorkflowStep::new("docs", Role::TechnicalWriter).writes("docs"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.task_status("review"), Some(TaskStatus::Failed));
    assert_eq!(report.task_status("docs"), Some(TaskStatus::Done));
    assert!(!report.context.contains("review"));
}

#[tokio::test]
async fn test_consumer_of_failed_optional_step_reports_missing_input() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Qa,
        &[Capability::ReviewCode],
        counter(),
        |_, _| Err(AgentError::InvalidInput("nothing to review".to_string())),
    )));
    registry.register(Box::new(ScriptedAgent::new(
        Role::TechnicalWriter,
        &[Capability::ProduceDocumentation],
        calls.clone(),
        |_, _| Ok(StepOutput::new(json!("# Docs"))),
    )));

    let spec = spec(
        "optional_consumer",
        vec![
            WorkflowStep::new("review", Role::Qa).writes("review").optional(),
            WorkflowStep::new("docs", Role::TechnicalWriter).reads("review"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    let (step_id, kind, _) = report.failure().unwrap();
    assert_eq!(step_id, Some("docs"));
    assert_eq!(kind, ErrorKind::MissingInput);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_declared_inputs_override_params() {
    let temp = TempDir::new().unwrap();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Architect,
        &[Capability::AnalyzeRequirements],
        counter(),
        |_, view| {
            Ok(StepOutput::new(json!({
                "text": view.str_input("request"),
                "mode": view.str_input("mode"),
            })))
        },
    )));

    let spec = spec(
        "params",
        vec![WorkflowStep::new("analyze", Role::Architect)
            .reads("request")
            .writes("text")
            .writes("mode")
            .with_param("request", "from params")
            .with_param("mode", "strict")],
    );
    let ctx = context(&temp).with_value("request", "from context");

    let report = WorkflowEngine::new(registry).run(&spec, ctx).await.unwrap();

    assert!(report.is_completed(), "run failed: {:?}", report.failure());
    assert_eq!(report.context.value("text"), Some(&json!("from context")));
    assert_eq!(report.context.value("mode"), Some(&json!("strict")));
}

#[tokio::test]
async fn test_cancellation_stops_scheduling() {
    let temp = TempDir::new().unwrap();
    let engine_calls = counter();
    let later_calls = counter();

    let mut registry = AgentRegistry::new();
    let engine_token = tokio_util::sync::CancellationToken::new();
    let token = engine_token.clone();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Architect,
        &[Capability::AnalyzeRequirements],
        engine_calls.clone(),
        move |_, _| {
            token.cancel();
            Ok(StepOutput::new(json!({"summary": "done"})))
        },
    )));
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        later_calls.clone(),
        |_, _| Ok(StepOutput::new(json!("code"))),
    )));

    let spec = spec(
        "cancel",
        vec![
            WorkflowStep::new("analyze", Role::Architect).writes("requirements"),
            WorkflowStep::new("generate", Role::Developer)
                .reads("requirements")
                .writes("code"),
        ],
    );

    let report = WorkflowEngine::new(registry)
        .with_cancellation(engine_token)
        .run(&spec, context(&temp))
        .await
        .unwrap();

    // The in-flight step finishes and commits; nothing after it starts
    assert_eq!(report.task_status("analyze"), Some(TaskStatus::Done));
    assert!(report.context.contains("requirements"));
    assert_eq!(report.task_status("generate"), Some(TaskStatus::Pending));
    assert_eq!(later_calls.load(Ordering::SeqCst), 0);

    let (step_id, kind, _) = report.failure().unwrap();
    assert_eq!(step_id, None);
    assert_eq!(kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_backoff() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |_, _| Err(AgentError::Failed("busy".to_string())),
    )));

    let spec = spec(
        "backoff",
        vec![WorkflowStep::new("generate", Role::Developer)
            .writes("code")
            .with_retry_policy(RetryPolicy {
                max_retries: 5,
                initial_delay_ms: 60_000,
                max_delay_ms: 60_000,
                backoff_multiplier: 1.0,
            })],
    );

    let engine = WorkflowEngine::new(registry);
    let token = engine.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), engine.run(&spec, context(&temp)))
        .await
        .expect("cancellation did not interrupt the backoff")
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.task_status("generate"), Some(TaskStatus::Failed));
    assert_eq!(report.failure().unwrap().1, ErrorKind::Cancelled);
}

fn barrier_registry() -> AgentRegistry {
    let barrier = Arc::new(Barrier::new(2));
    let mut registry = AgentRegistry::new();
    for role in [Role::Qa, Role::TechnicalWriter] {
        registry.register(Box::new(BarrierAgent {
            core: AgentCore::new(role, AgentConfig::default()),
            barrier: barrier.clone(),
        }));
    }
    registry
}

fn barrier_spec() -> WorkflowSpec {
    spec(
        "barrier",
        vec![
            WorkflowStep::new("review", Role::Qa)
                .writes("review")
                .independent()
                .with_timeout(2)
                .with_retry_policy(RetryPolicy::none()),
            WorkflowStep::new("docs", Role::TechnicalWriter)
                .writes("docs")
                .independent()
                .with_timeout(2)
                .with_retry_policy(RetryPolicy::none()),
        ],
    )
}

#[tokio::test]
async fn test_independent_steps_run_concurrently() {
    let temp = TempDir::new().unwrap();
    let options = EngineOptions {
        parallel: true,
        ..Default::default()
    };

    let report = WorkflowEngine::new(barrier_registry())
        .with_options(options)
        .run(&barrier_spec(), context(&temp))
        .await
        .unwrap();

    assert!(report.is_completed(), "run failed: {:?}", report.failure());
    assert_eq!(report.context.value("review"), Some(&json!("qa")));
    assert_eq!(report.context.value("docs"), Some(&json!("technical_writer")));
}

#[tokio::test]
async fn test_sequential_by_default() {
    let temp = TempDir::new().unwrap();

    // Without the parallel option the first step waits alone and times out
    let report = WorkflowEngine::new(barrier_registry())
        .run(&barrier_spec(), context(&temp))
        .await
        .unwrap();

    let (step_id, kind, _) = report.failure().unwrap();
    assert_eq!(step_id, Some("review"));
    assert_eq!(kind, ErrorKind::Timeout);
    assert_eq!(report.task_status("docs"), Some(TaskStatus::Pending));
}

#[tokio::test]
async fn test_seeded_output_conflict_fails_before_agents_run() {
    let temp = TempDir::new().unwrap();
    let calls = counter();
    let mut registry = AgentRegistry::new();
    registry.register(Box::new(ScriptedAgent::new(
        Role::Developer,
        &[Capability::GenerateCode],
        calls.clone(),
        |_, _| {
            Ok(StepOutput::new(json!("new code")).with_artifact(Artifact::new(
                "conflict",
                "x = 1\n",
                ArtifactKind::Module,
                Language::Python,
            )))
        },
    )));

    let spec = spec(
        "conflict",
        vec![WorkflowStep::new("generate", Role::Developer).writes("code")],
    );
    let ctx = context(&temp).with_value("code", "seeded");
    let options = EngineOptions {
        persist_artifacts: true,
        ..Default::default()
    };

    let report = WorkflowEngine::new(registry)
        .with_options(options)
        .run(&spec, ctx)
        .await
        .unwrap();

    let (step_id, kind, _) = report.failure().unwrap();
    assert_eq!(step_id, Some("generate"));
    assert_eq!(kind, ErrorKind::Context);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(report.persisted.is_empty());
    assert!(!temp.path().join("src").join("conflict.py").exists());
    assert_eq!(report.context.value("code"), Some(&json!("seeded")));
}

#[tokio::test]
async fn test_persist_artifacts_and_journal_replay() {
    let temp = TempDir::new().unwrap();
    let runs = TempDir::new().unwrap();
    let spec = WorkflowSpec::from_yaml(FACTORIAL_WORKFLOW).unwrap();
    let options = EngineOptions {
        persist_artifacts: true,
        ..Default::default()
    };

    let report = WorkflowEngine::new(default_team())
        .with_options(options)
        .with_journal(runs.path())
        .run(&spec, context(&temp))
        .await
        .unwrap();
    assert!(report.is_completed(), "run failed: {:?}", report.failure());

    let module = temp.path().join("src").join("factorial.py");
    assert!(report.persisted.contains(&module));
    assert_eq!(
        std::fs::read_to_string(&module).unwrap(),
        report.context.artifact("factorial").unwrap().content
    );

    let store = EventStore::open_in(runs.path(), report.run_id()).await.unwrap();
    let events = store.replay().await.unwrap();
    assert_eq!(events.first().unwrap().event_type, EventType::RunStarted);
    assert_eq!(events.last().unwrap().event_type, EventType::RunCompleted);
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::ArtifactPersisted));

    let run = store.load_run().await.unwrap().unwrap();
    assert_eq!(run.workflow_name, "factorial");
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.step_statuses, report.run.step_statuses);
}

#[tokio::test]
async fn test_invalid_workflow_is_an_error() {
    let temp = TempDir::new().unwrap();
    let spec = spec(
        "dupes",
        vec![
            WorkflowStep::new("generate", Role::Developer).writes("code"),
            WorkflowStep::new("generate", Role::Developer).writes("other"),
        ],
    );

    let result = WorkflowEngine::new(default_team())
        .run(&spec, context(&temp))
        .await;
    assert!(result.is_err());
}
