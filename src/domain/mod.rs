//! Domain types for the devcrew orchestrator.
//!
//! This module contains the core data structures:
//! - Artifact: Generated code units and their placement on disk
//! - Message: Agent-to-agent communication
//! - Context: Run-scoped shared state and per-step views
//! - Events / Run: Run journal and its replayed summary

pub mod artifact;
pub mod context;
pub mod events;
pub mod message;
pub mod run;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactError, ArtifactKind, Language};
pub use context::{ContextError, ProjectContext, ProjectMetadata, StepView, TaskStatus};
pub use events::{Event, EventType};
pub use message::{Message, Recipient};
pub use run::{Run, RunState};
