//! Workflow definitions and loading.
//!
//! Workflows are defined in YAML and consist of ordered steps, each binding
//! an agent role to the context keys it reads and writes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::safety::SafetyLimits;
use crate::agents::{Capability, Role};
use crate::domain::ProjectMetadata;
use crate::templates::{DirectorySource, LayeredSource, MemorySource, TemplateError, TemplateSource};

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Workflow name (used in the journal and CLI)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Project metadata defaults, merged under the metadata given at run time
    #[serde(default)]
    pub project: ProjectMetadata,

    /// Retry policy for steps that do not set their own
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Safety limits for this workflow
    #[serde(default)]
    pub safety_limits: SafetyLimits,

    /// Template bindings
    #[serde(default)]
    pub templates: TemplateBindings,

    /// Ordered list of steps to execute
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowSpec {
    /// Load a workflow from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a workflow from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow YAML")
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Workflow name cannot be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Workflow must have at least one step");
        }

        let mut ids = HashSet::new();
        let mut producers: HashMap<&str, &str> = HashMap::new();

        for (i, step) in self.steps.iter().enumerate() {
            if step.id.is_empty() {
                anyhow::bail!("Step {} has an empty id", i);
            }
            if !ids.insert(step.id.as_str()) {
                anyhow::bail!("Duplicate step id '{}'", step.id);
            }

            for key in &step.outputs {
                if let Some(other) = producers.insert(key.as_str(), step.id.as_str()) {
                    anyhow::bail!(
                        "Output key '{}' is written by both '{}' and '{}'",
                        key,
                        other,
                        step.id
                    );
                }
            }

            if let Some(key) = step.inputs.iter().find(|k| step.outputs.contains(*k)) {
                anyhow::bail!("Step '{}' reads its own output '{}'", step.id, key);
            }
        }

        // Steps that may run side by side must not feed each other
        for batch in self.batches() {
            if batch.len() < 2 {
                continue;
            }
            for step in &batch {
                for other in &batch {
                    if let Some(key) = step.inputs.iter().find(|k| other.outputs.contains(*k)) {
                        anyhow::bail!(
                            "Independent step '{}' reads '{}' from independent step '{}'",
                            step.id,
                            key,
                            other.id
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Get a step by id
    pub fn get_step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Group steps into execution batches, in declared order.
    ///
    /// Consecutive independent steps share a batch; every other step is a
    /// batch of its own.
    pub fn batches(&self) -> Vec<Vec<&WorkflowStep>> {
        let mut batches: Vec<Vec<&WorkflowStep>> = Vec::new();

        for step in &self.steps {
            match batches.last_mut() {
                Some(last) if step.independent && last.iter().all(|s| s.independent) => {
                    last.push(step)
                }
                _ => batches.push(vec![step]),
            }
        }

        batches
    }

    /// Retry policy in force for `step`
    pub fn retry_policy_for<'a>(&'a self, step: &'a WorkflowStep) -> &'a RetryPolicy {
        step.retry_policy.as_ref().unwrap_or(&self.retry_policy)
    }
}

/// Templates a workflow brings along
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateBindings {
    /// Directory of template files, relative to the working directory
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Templates given inline (name -> source)
    #[serde(default)]
    pub inline: BTreeMap<String, String>,
}

impl TemplateBindings {
    pub fn is_empty(&self) -> bool {
        self.dir.is_none() && self.inline.is_empty()
    }

    /// Layer these bindings over `base`: inline templates first, then the
    /// directory (resolved against `root` when relative), then `base`
    pub fn source(
        &self,
        root: &Path,
        base: Arc<dyn TemplateSource>,
    ) -> Result<Arc<dyn TemplateSource>, TemplateError> {
        if self.is_empty() {
            return Ok(base);
        }

        let mut layered = LayeredSource::new();
        if !self.inline.is_empty() {
            let inline: MemorySource = self.inline.clone().into_iter().collect();
            layered = layered.with_layer(Arc::new(inline));
        }
        if let Some(dir) = &self.dir {
            let dir = if dir.is_absolute() { dir.clone() } else { root.join(dir) };
            layered = layered.with_layer(Arc::new(DirectorySource::scan(dir)?));
        }
        Ok(Arc::new(layered.with_layer(base)))
    }
}

/// A single step in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id (unique within the workflow; also the task id)
    pub id: String,

    /// Role of the agent that runs the step
    pub agent: Role,

    /// Capability to invoke (defaults per role)
    #[serde(default)]
    pub action: Option<Capability>,

    /// Context keys read by the step
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Context keys written by the step
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Static arguments; declared inputs take precedence on a name clash
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    /// A failure of this step does not halt the run
    #[serde(default)]
    pub optional: bool,

    /// May run concurrently with neighbouring independent steps
    #[serde(default)]
    pub independent: bool,

    /// Override timeout for this step (uses safety_limits.step_timeout_seconds if not set)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Override the workflow retry policy
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, agent: Role) -> Self {
        Self {
            id: id.into(),
            agent,
            action: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: BTreeMap::new(),
            optional: false,
            independent: false,
            timeout_seconds: None,
            retry_policy: None,
        }
    }

    pub fn with_action(mut self, action: Capability) -> Self {
        self.action = Some(action);
        self
    }

    pub fn reads(mut self, key: impl Into<String>) -> Self {
        self.inputs.push(key.into());
        self
    }

    pub fn writes(mut self, key: impl Into<String>) -> Self {
        self.outputs.push(key.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Capability this step invokes
    pub fn capability(&self) -> Capability {
        self.action.unwrap_or_else(|| self.agent.default_capability())
    }

    /// Get the effective timeout for this step
    pub fn timeout(&self, limits: &SafetyLimits) -> Duration {
        let seconds = self.timeout_seconds.unwrap_or(limits.step_timeout_seconds);
        Duration::from_secs(seconds)
    }
}

/// Retry policy for failed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    1
}
fn default_initial_delay() -> u64 {
    0
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Upper bound on attempts, first try included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another attempt is allowed after `attempt` failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}
