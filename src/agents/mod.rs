//! Agent abstraction.
//!
//! Four fixed roles, each implementing a subset of the capability set.
//! The engine dispatches a step to the agent registered for its role and
//! calls [`Agent::perform`], which routes to the capability method. Agents
//! only see the owned [`StepView`] for the step; anything they want to
//! share goes back through [`StepOutput`].

pub mod analysis;
pub mod architect;
pub mod developer;
pub mod qa;
pub mod registry;
pub mod review;
pub mod structure;
pub mod writer;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::codegen::CodegenError;
use crate::core::{SafetyLimits, SafetyViolation};
use crate::domain::{Artifact, ArtifactError, Language, Message, StepView};
use crate::error::ErrorKind;
use crate::storage::{write_atomic, WriteError};

pub use architect::Architect;
pub use developer::Developer;
pub use qa::QaEngineer;
pub use registry::{AgentRegistry, SharedAgent};
pub use writer::TechnicalWriter;

/// The fixed set of agent roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Architect,
    Developer,
    Qa,
    TechnicalWriter,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Architect,
        Role::Developer,
        Role::Qa,
        Role::TechnicalWriter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Developer => "developer",
            Self::Qa => "qa",
            Self::TechnicalWriter => "technical_writer",
        }
    }

    /// Capability a step runs when it names no action
    pub fn default_capability(self) -> Capability {
        match self {
            Self::Architect => Capability::AnalyzeRequirements,
            Self::Developer => Capability::GenerateCode,
            Self::Qa => Capability::ReviewCode,
            Self::TechnicalWriter => Capability::ProduceDocumentation,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Operations an agent may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    AnalyzeRequirements,
    AnalyzeStructure,
    DesignSystem,
    GenerateCode,
    WriteCode,
    ReviewCode,
    GenerateTests,
    ProduceDocumentation,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeRequirements => "analyze_requirements",
            Self::AnalyzeStructure => "analyze_structure",
            Self::DesignSystem => "design_system",
            Self::GenerateCode => "generate_code",
            Self::WriteCode => "write_code",
            Self::ReviewCode => "review_code",
            Self::GenerateTests => "generate_tests",
            Self::ProduceDocumentation => "produce_documentation",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by agent capabilities
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent '{role}' does not support '{capability}'")]
    Unsupported { role: Role, capability: Capability },

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    #[error("Agent failed: {0}")]
    Failed(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Unsupported { .. } => ErrorKind::UnsupportedCapability,
            Self::Codegen(e) => e.kind(),
            Self::Write(e) | Self::Artifact(ArtifactError::Write(e)) => write_kind(e),
            Self::Artifact(ArtifactError::InvalidName(_)) => ErrorKind::InvalidInput,
            Self::Safety(_) => ErrorKind::Safety,
            Self::Failed(_) => ErrorKind::AgentFailed,
        }
    }
}

fn write_kind(err: &WriteError) -> ErrorKind {
    match err {
        WriteError::FileExists(_) => ErrorKind::FileExists,
        WriteError::Io { .. } => ErrorKind::Io,
    }
}

/// Static agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default language for generated and reviewed code
    #[serde(default)]
    pub language: Language,

    /// Free-form settings
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

/// Private key-value memory of a single agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMemory {
    entries: BTreeMap<String, Value>,
}

impl AgentMemory {
    pub fn remember(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn recall(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn forget(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Append to a list entry, creating it if needed
    pub fn push(&mut self, key: &str, value: Value) {
        match self.entries.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                self.entries.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity, role, configuration and memory shared by every agent
#[derive(Debug, Clone)]
pub struct AgentCore {
    pub id: Uuid,
    pub role: Role,
    pub config: AgentConfig,
    pub memory: AgentMemory,
}

impl AgentCore {
    pub fn new(role: Role, config: AgentConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            config,
            memory: AgentMemory::default(),
        }
    }
}

/// An annotation to add to an existing artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub artifact: String,
    pub key: String,
    pub value: Value,
}

/// Everything a capability call hands back to the engine
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Primary result, written to the step's output keys
    pub value: Value,

    /// Messages to post to the run history
    pub messages: Vec<Message>,

    /// Artifacts produced
    pub artifacts: Vec<Artifact>,

    /// Annotations for previously produced artifacts
    pub annotations: Vec<Annotation>,
}

impl StepOutput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Primary result from any serializable value
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, AgentError> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(|e| AgentError::Failed(format!("cannot serialize result: {}", e)))
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_annotation(
        mut self,
        artifact: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.annotations.push(Annotation {
            artifact: artifact.into(),
            key: key.into(),
            value,
        });
        self
    }
}

/// A role-bound unit of work.
///
/// Every capability method defaults to [`AgentError::Unsupported`]; concrete
/// agents override the subset they implement and list it in
/// [`Agent::capabilities`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    /// Capabilities this agent implements
    fn capabilities(&self) -> &'static [Capability];

    fn id(&self) -> Uuid {
        self.core().id
    }

    fn role(&self) -> Role {
        self.core().role
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    fn unsupported(&self, capability: Capability) -> AgentError {
        AgentError::Unsupported {
            role: self.role(),
            capability,
        }
    }

    /// Route a capability call to its method
    async fn perform(
        &mut self,
        capability: Capability,
        view: &StepView,
    ) -> Result<StepOutput, AgentError> {
        match capability {
            Capability::AnalyzeRequirements => self.analyze_requirements(view).await,
            Capability::AnalyzeStructure => self.analyze_structure(view).await,
            Capability::DesignSystem => self.design_system(view).await,
            Capability::GenerateCode => self.generate_code(view).await,
            Capability::WriteCode => self.write_code(view).await,
            Capability::ReviewCode => self.review_code(view).await,
            Capability::GenerateTests => self.generate_tests(view).await,
            Capability::ProduceDocumentation => self.produce_documentation(view).await,
        }
    }

    async fn analyze_requirements(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::AnalyzeRequirements))
    }

    async fn analyze_structure(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::AnalyzeStructure))
    }

    async fn design_system(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::DesignSystem))
    }

    async fn generate_code(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::GenerateCode))
    }

    async fn write_code(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::WriteCode))
    }

    async fn review_code(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::ReviewCode))
    }

    async fn generate_tests(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::GenerateTests))
    }

    async fn produce_documentation(&mut self, _view: &StepView) -> Result<StepOutput, AgentError> {
        Err(self.unsupported(Capability::ProduceDocumentation))
    }
}

/// Persist `code` at `path` below `root`.
///
/// `path` must be relative and stay inside `root`. Fails with
/// [`WriteError::FileExists`] when the target exists and `overwrite` is
/// false, and with [`WriteError::Io`] when the location is unwritable.
pub fn write_code(
    root: &Path,
    path: &str,
    code: &str,
    overwrite: bool,
    limits: &SafetyLimits,
) -> Result<PathBuf, AgentError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.trim().is_empty() || escapes {
        return Err(AgentError::InvalidInput(format!(
            "path '{}' must be relative to the output directory",
            path
        )));
    }

    let target = root.join(relative);
    limits.validate_write_path(&target)?;
    limits.validate_content(code)?;
    write_atomic(&target, code, overwrite)?;
    Ok(target)
}

/// Text carried by an input: the string itself, or the first of
/// `text`/`code`/`description`/`summary` found on an object
pub(crate) fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["text", "code", "description", "summary"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    }
}

/// First input among `keys` that carries text
pub(crate) fn first_text<'a>(view: &'a StepView, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| view.input(k))
        .find_map(text_of)
}
