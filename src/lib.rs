//! devcrew - a workflow engine for a team of development agents
//!
//! Four agents (architect, developer, QA engineer, technical writer) are
//! driven through a declared workflow. Each step reads named values from the
//! run context, invokes one agent capability and writes its outputs back.
//! Agents that produce code go through the template-driven code generator.
//!
//! # Modules
//!
//! - `agents`: Agent roles, capabilities and the role registry
//! - `codegen`: Artifact generation from descriptors and templates
//! - `templates`: Template sources and rendering
//! - `core`: Workflow definitions, the engine, safety limits and the run journal
//! - `domain`: Data structures (Artifact, Message, ProjectContext, Event, Run)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow
//! devcrew run workflows/feature.yaml --requirements "Create a factorial function"
//!
//! # Check run status
//! devcrew status <run-id>
//! ```

pub mod agents;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod storage;
pub mod templates;

// Re-export main types at crate root for convenience
pub use agents::{Agent, AgentRegistry, Capability, Role, StepOutput};
pub use codegen::{CodeGenerator, ModuleSpec};
pub use core::{EngineOptions, RetryPolicy, RunReport, WorkflowEngine, WorkflowSpec, WorkflowStep};
pub use domain::{Artifact, ArtifactKind, Event, EventType, Language, Message, ProjectContext, Run, RunState};
pub use error::{ErrorKind, StepError};
