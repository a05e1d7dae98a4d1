//! Workflow engine.
//!
//! Runs a [`WorkflowSpec`] against a [`ProjectContext`]. The engine owns the
//! context for the whole run: each step gets an owned [`StepView`] holding
//! only its declared inputs, and its outputs are committed once the step has
//! finished. Steps run strictly in declared order; with
//! [`EngineOptions::parallel`] set, consecutive independent steps run
//! concurrently and are joined before the next step starts.
//!
//! Step failures do not surface as `Err`: the returned [`RunReport`] carries
//! the failing step, error kind and message. `Err` is reserved for invalid
//! workflows and journal I/O.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::event_store::EventStore;
use super::safety::{SafetyLimits, SafetyTracker};
use super::workflow::{RetryPolicy, WorkflowSpec, WorkflowStep};
use crate::agents::{AgentError, AgentRegistry, Annotation, Capability, SharedAgent};
use crate::domain::{
    Artifact, ContextError, Event, EventType, Message, ProjectContext, Run, StepView, TaskStatus,
};
use crate::error::{ErrorKind, StepError};

/// Engine behaviour switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Run consecutive independent steps concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Save every produced artifact under the context's output root
    #[serde(default)]
    pub persist_artifacts: bool,

    /// Replace existing files when persisting artifacts
    #[serde(default)]
    pub overwrite_artifacts: bool,
}

/// Outcome of a workflow run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run summary (state, step statuses, attempts)
    pub run: Run,

    /// Final context
    pub context: ProjectContext,

    /// Files written while persisting artifacts
    pub persisted: Vec<PathBuf>,
}

impl RunReport {
    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn is_completed(&self) -> bool {
        self.run.is_completed()
    }

    /// Failing step id, error kind and message, if the run halted
    pub fn failure(&self) -> Option<(Option<&str>, ErrorKind, &str)> {
        self.run.failure()
    }

    pub fn task_status(&self, step_id: &str) -> Option<TaskStatus> {
        self.context.task_status(step_id)
    }

    /// Attempts made for a step
    pub fn attempts(&self, step_id: &str) -> u32 {
        self.run.attempts.get(step_id).copied().unwrap_or(0)
    }
}

/// Drives workflows through the registered agents
pub struct WorkflowEngine {
    registry: AgentRegistry,
    options: EngineOptions,
    journal_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    /// Create an engine dispatching to `registry`
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            options: EngineOptions::default(),
            journal_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Record every run as a JSONL journal under `dir/<run_id>/`
    pub fn with_journal(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this engine when triggered.
    ///
    /// Cancellation is sticky: once triggered, later runs fail immediately.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Execute `spec` starting from `context`
    #[instrument(skip(self, spec, context), fields(workflow = %spec.name))]
    pub async fn run(&self, spec: &WorkflowSpec, mut context: ProjectContext) -> Result<RunReport> {
        spec.validate()?;
        context.project.merge_defaults(&spec.project);

        let run_id = Uuid::new_v4();
        info!(%run_id, steps = spec.steps.len(), "Starting workflow run");

        let store = match &self.journal_dir {
            Some(dir) => Some(EventStore::open_in(dir, run_id).await?),
            None => None,
        };
        let mut exec = Execution {
            run: Run::new(run_id, spec.name.clone()),
            store,
            context,
            tracker: SafetyTracker::new(),
            persisted: Vec::new(),
        };

        exec.emit(Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("workflow:{}", spec.name),
            TaskStatus::InProgress,
        ))
        .await?;

        for step in &spec.steps {
            exec.context.register_task(step.id.clone());
        }

        // Configuration errors stop the run before any agent is invoked
        if let Some((step, err)) = self.preflight(spec, &exec.context).await {
            exec.fail_step(step, &err, 0, 0).await?;
            return exec.halt(Some(step), &err).await;
        }

        let batches: Vec<Vec<&WorkflowStep>> = if self.options.parallel {
            spec.batches()
        } else {
            spec.steps.iter().map(|s| vec![s]).collect()
        };

        for batch in batches {
            if self.cancel.is_cancelled() {
                return exec.cancelled().await;
            }

            if let Err(violation) = spec.safety_limits.check(&exec.tracker, batch.len() as u32) {
                let err = StepError::Safety(violation);
                exec.fail_step(batch[0], &err, 0, 0).await?;
                return exec.halt(Some(batch[0]), &err).await;
            }

            let mut ready = Vec::with_capacity(batch.len());
            for step in batch {
                match self.resolve(step, &exec.context) {
                    Ok(agent) => ready.push((step, agent)),
                    Err(err) if step.optional => {
                        exec.fail_step(step, &err, 0, 0).await?;
                        warn!(step = %step.id, error = %err, "Optional step skipped");
                    }
                    Err(err) => {
                        exec.fail_step(step, &err, 0, 0).await?;
                        return exec.halt(Some(step), &err).await;
                    }
                }
            }

            let mut prepared = Vec::with_capacity(ready.len());
            for (step, agent) in ready {
                prepared.push(Prepared {
                    step,
                    capability: step.capability(),
                    agent,
                    view: exec.view_for(step, &spec.safety_limits)?,
                    policy: spec.retry_policy_for(step),
                });
            }

            let env = StepEnv {
                run_id,
                store: exec.store.clone(),
                limits: &spec.safety_limits,
            };
            let results: Vec<StepResult<'_>> = if prepared.len() > 1 {
                debug!(steps = prepared.len(), "Running independent steps concurrently");
                join_all(prepared.into_iter().map(|p| self.execute(p, &env)))
                    .await
                    .into_iter()
                    .collect::<Result<_>>()?
            } else {
                let mut results = Vec::with_capacity(1);
                for p in prepared {
                    results.push(self.execute(p, &env).await?);
                }
                results
            };

            let mut halted: Option<(&WorkflowStep, StepError)> = None;
            for result in results {
                for event in &result.events {
                    exec.run.apply_event(event);
                }

                let step = result.step;
                let outcome = match result.outcome {
                    Ok(products) => exec.commit(step, products),
                    Err(err) => Err(err),
                };

                match outcome {
                    Ok(()) => {
                        exec.complete_step(step, result.attempts, result.duration_ms)
                            .await?
                    }
                    Err(err) => {
                        exec.fail_step(step, &err, result.attempts, result.duration_ms)
                            .await?;
                        if step.optional {
                            warn!(step = %step.id, error = %err, "Optional step failed, continuing");
                        } else if halted.is_none() {
                            halted = Some((step, err));
                        }
                    }
                }
            }

            if self.cancel.is_cancelled() {
                return exec.cancelled().await;
            }
            if let Some((step, err)) = halted {
                return exec.halt(Some(step), &err).await;
            }
        }

        exec.finish().await
    }

    /// Static checks over the whole workflow: every input is seeded or
    /// produced by an earlier step, no output is already seeded, and every
    /// step has a capable agent.
    async fn preflight<'a>(
        &self,
        spec: &'a WorkflowSpec,
        context: &ProjectContext,
    ) -> Option<(&'a WorkflowStep, StepError)> {
        let mut available: HashSet<&str> = context.values().keys().map(String::as_str).collect();

        for batch in spec.batches() {
            for &step in &batch {
                let missing: Vec<String> = step
                    .inputs
                    .iter()
                    .filter(|k| !available.contains(k.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Some((
                        step,
                        StepError::MissingInput {
                            step: step.id.clone(),
                            keys: missing,
                        },
                    ));
                }

                // Seeded values are write-once too
                if let Some(key) = step.outputs.iter().find(|k| context.values().contains_key(*k)) {
                    return Some((step, ContextError::KeyAlreadyWritten(key.clone()).into()));
                }

                let Some(agent) = self.registry.get(step.agent) else {
                    return Some((
                        step,
                        StepError::UnknownAgent {
                            step: step.id.clone(),
                            role: step.agent,
                        },
                    ));
                };

                let capability = step.capability();
                if !agent.lock().await.supports(capability) {
                    return Some((
                        step,
                        StepError::Agent(AgentError::Unsupported {
                            role: step.agent,
                            capability,
                        }),
                    ));
                }
            }

            for &step in &batch {
                available.extend(step.outputs.iter().map(String::as_str));
            }
        }

        None
    }

    /// Runtime readiness: inputs present now (a producer may have been an
    /// optional step that failed) and an agent to run the step
    fn resolve(&self, step: &WorkflowStep, context: &ProjectContext) -> Result<SharedAgent, StepError> {
        let missing = context.missing_keys(&step.inputs);
        if !missing.is_empty() {
            return Err(StepError::MissingInput {
                step: step.id.clone(),
                keys: missing,
            });
        }

        self.registry
            .get(step.agent)
            .ok_or_else(|| StepError::UnknownAgent {
                step: step.id.clone(),
                role: step.agent,
            })
    }

    /// Run a prepared step with retries. Journal failures are the only `Err`.
    async fn execute<'a>(&self, prepared: Prepared<'a>, env: &StepEnv<'_>) -> Result<StepResult<'a>> {
        let step = prepared.step;
        let started = Instant::now();
        let mut events = Vec::new();
        let mut attempt = 0u32;

        let outcome = loop {
            attempt += 1;

            let event = Event::new(
                env.run_id,
                Some(step.id.clone()),
                EventType::StepStarted,
                format!("Step '{}' attempt {}", step.id, attempt),
                TaskStatus::InProgress,
            )
            .with_attempt(attempt);
            env.record(&event).await?;
            events.push(event);

            info!(
                step = %step.id,
                agent = %step.agent,
                action = %prepared.capability,
                attempt,
                "Starting step"
            );

            let err = match self.attempt(&prepared, env.limits).await {
                Ok(products) => break Ok(products),
                Err(err) => err,
            };

            if !err.is_retryable() || !prepared.policy.should_retry(attempt) {
                break Err(err);
            }
            if self.cancel.is_cancelled() {
                break Err(StepError::Cancelled);
            }

            let delay = prepared.policy.delay_for_attempt(attempt);
            let event = Event::new(
                env.run_id,
                Some(step.id.clone()),
                EventType::StepRetrying,
                format!("Step '{}' failed, retrying in {:?}", step.id, delay),
                TaskStatus::InProgress,
            )
            .with_attempt(attempt)
            .with_error(err.kind(), err.to_string());
            env.record(&event).await?;
            events.push(event);

            warn!(
                step = %step.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Step failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => break Err(StepError::Cancelled),
            }
        };

        if let Ok(products) = &outcome {
            for path in &products.persisted {
                let event = Event::new(
                    env.run_id,
                    Some(step.id.clone()),
                    EventType::ArtifactPersisted,
                    path.display().to_string(),
                    TaskStatus::InProgress,
                );
                env.record(&event).await?;
                events.push(event);
            }
        }

        Ok(StepResult {
            step,
            attempts: attempt,
            duration_ms: started.elapsed().as_millis() as u64,
            events,
            outcome,
        })
    }

    /// One invocation of the step's capability
    async fn attempt(
        &self,
        prepared: &Prepared<'_>,
        limits: &SafetyLimits,
    ) -> Result<StepProducts, StepError> {
        let step = prepared.step;
        let timeout = step.timeout(limits);

        let output = {
            let mut agent = prepared.agent.lock().await;
            match tokio::time::timeout(timeout, agent.perform(prepared.capability, &prepared.view))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(StepError::Timeout {
                        step: step.id.clone(),
                        seconds: timeout.as_secs(),
                    })
                }
            }
        };

        let values = map_outputs(step, output.value)?;

        let root = &prepared.view.output_root;
        for artifact in &output.artifacts {
            limits.validate_artifact(artifact, root)?;
        }

        let mut persisted = Vec::new();
        if self.options.persist_artifacts {
            for artifact in &output.artifacts {
                let path = artifact
                    .save(root, self.options.overwrite_artifacts)
                    .map_err(AgentError::from)?;
                persisted.push(path);
            }
        }

        Ok(StepProducts {
            values,
            messages: output.messages,
            artifacts: output.artifacts,
            annotations: output.annotations,
            persisted,
        })
    }
}

/// Route a step's primary value to its output keys.
///
/// A single key receives the whole value; several keys each take the field
/// of the same name from an object value.
fn map_outputs(step: &WorkflowStep, value: Value) -> Result<Vec<(String, Value)>, StepError> {
    match step.outputs.as_slice() {
        [] => Ok(Vec::new()),
        [key] => Ok(vec![(key.clone(), value)]),
        keys => keys
            .iter()
            .map(|key| {
                value
                    .get(key)
                    .cloned()
                    .map(|v| (key.clone(), v))
                    .ok_or_else(|| StepError::MissingOutput {
                        step: step.id.clone(),
                        key: key.clone(),
                    })
            })
            .collect(),
    }
}

/// A step ready to run
struct Prepared<'a> {
    step: &'a WorkflowStep,
    capability: Capability,
    agent: SharedAgent,
    view: StepView,
    policy: &'a RetryPolicy,
}

/// Everything a successful step hands back for commit
struct StepProducts {
    values: Vec<(String, Value)>,
    messages: Vec<Message>,
    artifacts: Vec<Artifact>,
    annotations: Vec<Annotation>,
    persisted: Vec<PathBuf>,
}

struct StepResult<'a> {
    step: &'a WorkflowStep,
    attempts: u32,
    duration_ms: u64,
    events: Vec<Event>,
    outcome: Result<StepProducts, StepError>,
}

/// Shared, read-only state for steps running in one batch
struct StepEnv<'a> {
    run_id: Uuid,
    store: Option<EventStore>,
    limits: &'a SafetyLimits,
}

impl StepEnv<'_> {
    async fn record(&self, event: &Event) -> Result<()> {
        if let Some(store) = &self.store {
            store.append(event).await?;
        }
        Ok(())
    }
}

/// Mutable state of a single run
struct Execution {
    run: Run,
    store: Option<EventStore>,
    context: ProjectContext,
    tracker: SafetyTracker,
    persisted: Vec<PathBuf>,
}

impl Execution {
    /// Journal an event and fold it into the run summary
    async fn emit(&mut self, event: Event) -> Result<()> {
        if let Some(store) = &self.store {
            store.append(&event).await?;
        }
        self.run.apply_event(&event);
        Ok(())
    }

    fn view_for(&mut self, step: &WorkflowStep, limits: &SafetyLimits) -> Result<StepView> {
        let mut inputs = step.params.clone();
        inputs.extend(self.context.scoped_values(&step.inputs));

        let view = StepView {
            step_id: step.id.clone(),
            project: self.context.project.clone(),
            inputs,
            inbox: self.context.take_inbox(step.agent),
            output_root: self.context.output_root.clone(),
            limits: limits.clone(),
        };
        self.context.transition(&step.id, TaskStatus::InProgress)?;
        Ok(view)
    }

    /// Write a finished step's products into the context. Output keys are
    /// checked before anything is written.
    fn commit(&mut self, step: &WorkflowStep, products: StepProducts) -> Result<(), StepError> {
        for (key, _) in &products.values {
            if self.context.contains(key) {
                return Err(ContextError::KeyAlreadyWritten(key.clone()).into());
            }
        }

        let bytes: u64 = products.artifacts.iter().map(Artifact::size_bytes).sum();
        for artifact in products.artifacts {
            if let Some(old) = self.context.put_artifact(artifact) {
                debug!(artifact = %old.name, "Artifact superseded");
            }
        }

        for note in products.annotations {
            if let Err(err) = self
                .context
                .annotate_artifact(&note.artifact, note.key, note.value)
            {
                warn!(step = %step.id, error = %err, "Dropping annotation");
            }
        }

        for message in products.messages {
            self.context.post(message);
        }

        for (key, value) in products.values {
            self.context.insert_value(key, value)?;
        }

        self.persisted.extend(products.persisted);
        self.tracker.record_step(bytes);
        Ok(())
    }

    async fn complete_step(&mut self, step: &WorkflowStep, attempts: u32, duration_ms: u64) -> Result<()> {
        self.context.transition(&step.id, TaskStatus::Done)?;

        let event = Event::new(
            self.run.id,
            Some(step.id.clone()),
            EventType::StepCompleted,
            format!("Step '{}' completed in {}ms", step.id, duration_ms),
            TaskStatus::Done,
        )
        .with_attempt(attempts)
        .with_duration(duration_ms);
        self.emit(event).await?;

        info!(step = %step.id, attempts, duration_ms, "Step completed");
        Ok(())
    }

    async fn fail_step(
        &mut self,
        step: &WorkflowStep,
        err: &StepError,
        attempts: u32,
        duration_ms: u64,
    ) -> Result<()> {
        self.context.transition(&step.id, TaskStatus::Failed)?;

        let mut event = Event::new(
            self.run.id,
            Some(step.id.clone()),
            EventType::StepFailed,
            format!("Step '{}' failed after {} attempt(s)", step.id, attempts),
            TaskStatus::Failed,
        )
        .with_duration(duration_ms)
        .with_error(err.kind(), err.to_string());
        if attempts > 0 {
            event = event.with_attempt(attempts);
        }
        self.emit(event).await?;

        error!(step = %step.id, attempts, kind = %err.kind(), error = %err, "Step failed permanently");
        Ok(())
    }

    async fn halt(mut self, step: Option<&WorkflowStep>, err: &StepError) -> Result<RunReport> {
        error!(kind = %err.kind(), error = %err, "Run failed");

        let event = Event::new(
            self.run.id,
            step.map(|s| s.id.clone()),
            EventType::RunFailed,
            format!("Run failed: {}", err),
            TaskStatus::Failed,
        )
        .with_error(err.kind(), err.to_string());
        self.emit(event).await?;

        Ok(self.into_report())
    }

    async fn cancelled(mut self) -> Result<RunReport> {
        warn!(run_id = %self.run.id, "Run cancelled");

        let event = Event::new(
            self.run.id,
            None,
            EventType::RunCancelled,
            "Run cancelled".to_string(),
            TaskStatus::Failed,
        )
        .with_error(ErrorKind::Cancelled, StepError::Cancelled.to_string());
        self.emit(event).await?;

        Ok(self.into_report())
    }

    async fn finish(mut self) -> Result<RunReport> {
        info!(run_id = %self.run.id, "Run completed successfully");

        let event = Event::new(
            self.run.id,
            None,
            EventType::RunCompleted,
            format!("Workflow '{}' completed", self.run.workflow_name),
            TaskStatus::Done,
        );
        self.emit(event).await?;

        Ok(self.into_report())
    }

    fn into_report(self) -> RunReport {
        RunReport {
            run: self.run,
            context: self.context,
            persisted: self.persisted,
        }
    }
}
