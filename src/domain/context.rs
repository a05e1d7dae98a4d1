//! Run-scoped project context.
//!
//! The context is owned by the workflow engine for the duration of a run.
//! Agents never hold it directly: each step receives a [`StepView`] holding
//! only the keys the step declared, and the engine commits the step's outputs
//! once the step has completed.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::artifact::Artifact;
use super::message::Message;
use crate::agents::Role;
use crate::core::SafetyLimits;

/// Context invariant violations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Context key '{0}' was already written in this run")]
    KeyAlreadyWritten(String),

    #[error("Invalid status transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Unknown artifact '{0}'")]
    UnknownArtifact(String),
}

/// Project-level metadata seeded into every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project name
    #[serde(default)]
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Free-form requirements text
    #[serde(default)]
    pub requirements: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Any further settings
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            requirements: String::new(),
            version: default_version(),
            extra: BTreeMap::new(),
        }
    }
}

impl ProjectMetadata {
    /// Fill fields left empty from `defaults`
    pub fn merge_defaults(&mut self, defaults: &ProjectMetadata) {
        for (field, default) in [
            (&mut self.name, &defaults.name),
            (&mut self.description, &defaults.description),
            (&mut self.requirements, &defaults.requirements),
        ] {
            if field.is_empty() {
                field.clone_from(default);
            }
        }
        for (key, value) in &defaults.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Status of a workflow task. Transitions only move forward:
/// `pending -> in_progress -> {done, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Done | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotone
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Done or failed
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Mutable state accumulated over a single workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Project metadata
    pub project: ProjectMetadata,

    /// Root directory for files written during the run
    pub output_root: PathBuf,

    /// Values written by steps (write-once per key)
    values: BTreeMap<String, Value>,

    /// Every message posted during the run, in order
    messages: Vec<Message>,

    /// Artifacts by name; a newer artifact with the same name supersedes the old
    artifacts: BTreeMap<String, Artifact>,

    /// Status per task (step id)
    task_status: BTreeMap<String, TaskStatus>,

    /// Per-role position in `messages` up to which the inbox was consumed
    #[serde(skip)]
    inbox_cursors: HashMap<Role, usize>,
}

impl ProjectContext {
    /// Create an empty context for a project
    pub fn new(project: ProjectMetadata, output_root: impl Into<PathBuf>) -> Self {
        Self {
            project,
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    /// Seed an initial value (builder style)
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Read a value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All values
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Write a value. Each key may only be written once per run.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Result<(), ContextError> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(ContextError::KeyAlreadyWritten(key));
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Keys from `keys` that are not present, in the given order
    pub fn missing_keys<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter(|k| !self.values.contains_key(k.as_str()))
            .cloned()
            .collect()
    }

    /// Copy out the values of `keys` that are present
    pub fn scoped_values<'a, I>(&self, keys: I) -> BTreeMap<String, Value>
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Store an artifact, returning the one it superseded (if any)
    pub fn put_artifact(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.artifacts.insert(artifact.name.clone(), artifact)
    }

    /// Look up an artifact by name
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// All artifacts, ordered by name
    pub fn artifacts(&self) -> &BTreeMap<String, Artifact> {
        &self.artifacts
    }

    /// Add a metadata annotation to an existing artifact
    pub fn annotate_artifact(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), ContextError> {
        let artifact = self
            .artifacts
            .get_mut(name)
            .ok_or_else(|| ContextError::UnknownArtifact(name.to_string()))?;
        artifact.annotate(key, value);
        Ok(())
    }

    /// Append a message to the history
    pub fn post(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Full message history, in posting order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Deliver the messages addressed to `role` that it has not seen yet.
    ///
    /// Each message is delivered to a given role at most once; the history
    /// itself is left intact.
    pub fn take_inbox(&mut self, role: Role) -> Vec<Message> {
        let start = self.inbox_cursors.get(&role).copied().unwrap_or(0);
        let delivered = self.messages[start..]
            .iter()
            .filter(|m| m.is_addressed_to(role))
            .cloned()
            .collect();
        self.inbox_cursors.insert(role, self.messages.len());
        delivered
    }

    /// Register a task as pending (no-op if already known)
    pub fn register_task(&mut self, task_id: impl Into<String>) {
        self.task_status.entry(task_id.into()).or_default();
    }

    /// Current status of a task
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.task_status.get(task_id).copied()
    }

    /// Status of every task
    pub fn task_statuses(&self) -> &BTreeMap<String, TaskStatus> {
        &self.task_status
    }

    /// Move a task forward. Reversals (and done <-> failed) are rejected.
    pub fn transition(&mut self, task_id: &str, next: TaskStatus) -> Result<(), ContextError> {
        let current = self
            .task_status
            .get_mut(task_id)
            .ok_or_else(|| ContextError::UnknownTask(task_id.to_string()))?;
        if !current.can_transition_to(next) {
            return Err(ContextError::InvalidTransition {
                task: task_id.to_string(),
                from: *current,
                to: next,
            });
        }
        *current = next;
        Ok(())
    }
}

/// The slice of context handed to an agent for one step
#[derive(Debug, Clone)]
pub struct StepView {
    /// Step being executed
    pub step_id: String,

    /// Project metadata (read-only)
    pub project: ProjectMetadata,

    /// Declared inputs merged with static step parameters
    pub inputs: BTreeMap<String, Value>,

    /// Messages delivered to the agent for this step
    pub inbox: Vec<Message>,

    /// Root directory for files written by the step
    pub output_root: PathBuf,

    /// Limits applying to files written by the step
    pub limits: SafetyLimits,
}

impl StepView {
    /// Raw input lookup
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// String input; objects are searched for a field of the same name
    /// (so a step can pass `{code: ..., language: ...}` where `code` is expected)
    pub fn str_input(&self, key: &str) -> Option<&str> {
        match self.inputs.get(key)? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get(key).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Boolean input, defaulting to `default`
    pub fn bool_input(&self, key: &str, default: bool) -> bool {
        self.inputs
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// First string found among `keys`
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.str_input(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactKind, Language};

    fn context() -> ProjectContext {
        ProjectContext::new(
            ProjectMetadata {
                name: "demo".to_string(),
                ..Default::default()
            },
            "/tmp/out",
        )
    }

    #[test]
    fn test_project_defaults_fill_gaps_only() {
        let mut project = ProjectMetadata {
            name: "given".to_string(),
            ..Default::default()
        };
        let defaults = ProjectMetadata {
            name: "default".to_string(),
            description: "from workflow".to_string(),
            ..Default::default()
        };

        project.merge_defaults(&defaults);

        assert_eq!(project.name, "given");
        assert_eq!(project.description, "from workflow");
    }

    #[test]
    fn test_values_are_write_once() {
        let mut ctx = context();
        ctx.insert_value("design", Value::from("layered")).unwrap();

        let err = ctx.insert_value("design", Value::from("other")).unwrap_err();
        assert_eq!(err, ContextError::KeyAlreadyWritten("design".to_string()));
        assert_eq!(ctx.value("design"), Some(&Value::from("layered")));
    }

    #[test]
    fn test_missing_keys_preserves_order() {
        let ctx = context().with_value("a", 1);
        let keys = vec!["c".to_string(), "a".to_string(), "b".to_string()];

        assert_eq!(ctx.missing_keys(&keys), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_task_status_is_monotone() {
        let mut ctx = context();
        ctx.register_task("build");
        assert_eq!(ctx.task_status("build"), Some(TaskStatus::Pending));

        ctx.transition("build", TaskStatus::InProgress).unwrap();
        ctx.transition("build", TaskStatus::Done).unwrap();

        assert!(ctx.transition("build", TaskStatus::InProgress).is_err());
        assert!(ctx.transition("build", TaskStatus::Failed).is_err());
        assert!(matches!(
            ctx.transition("nope", TaskStatus::Done),
            Err(ContextError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_artifact_supersedes_same_name() {
        let mut ctx = context();
        let first = Artifact::new("util", "v1", ArtifactKind::Module, Language::Python);
        let second = Artifact::new("util", "v2", ArtifactKind::Module, Language::Python);

        assert!(ctx.put_artifact(first).is_none());
        let old = ctx.put_artifact(second).unwrap();

        assert_eq!(old.content, "v1");
        assert_eq!(ctx.artifacts().len(), 1);
        assert_eq!(ctx.artifact("util").unwrap().content, "v2");
    }

    #[test]
    fn test_annotate_artifact() {
        let mut ctx = context();
        ctx.put_artifact(Artifact::new("util", "x", ArtifactKind::Module, Language::Python));

        ctx.annotate_artifact("util", "review", serde_json::json!({"passed": true}))
            .unwrap();
        assert_eq!(ctx.artifact("util").unwrap().metadata["review"]["passed"], true);
        assert!(ctx.annotate_artifact("missing", "review", Value::Null).is_err());
    }

    #[test]
    fn test_inbox_delivers_once() {
        let mut ctx = context();
        ctx.post(Message::to(Role::Architect, Role::Developer, "design"));
        ctx.post(Message::broadcast(Role::Qa, "review"));
        ctx.post(Message::to(Role::Architect, Role::TechnicalWriter, "docs"));

        let inbox = ctx.take_inbox(Role::Developer);
        assert_eq!(inbox.len(), 2);
        assert!(ctx.take_inbox(Role::Developer).is_empty());

        ctx.post(Message::broadcast(Role::Architect, "update"));
        assert_eq!(ctx.take_inbox(Role::Developer).len(), 1);
        assert_eq!(ctx.messages().len(), 4);
    }

    #[test]
    fn test_step_view_string_lookup() {
        let view = StepView {
            step_id: "write".to_string(),
            project: ProjectMetadata::default(),
            inputs: [
                ("path".to_string(), Value::from("out.py")),
                (
                    "code".to_string(),
                    serde_json::json!({"code": "print(1)", "language": "python"}),
                ),
            ]
            .into_iter()
            .collect(),
            inbox: Vec::new(),
            output_root: PathBuf::from("."),
            limits: SafetyLimits::default(),
        };

        assert_eq!(view.str_input("path"), Some("out.py"));
        assert_eq!(view.str_input("code"), Some("print(1)"));
        assert_eq!(view.first_str(&["task", "path"]), Some("out.py"));
        assert!(!view.bool_input("overwrite", false));
    }
}
