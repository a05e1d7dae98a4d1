//! Core orchestration logic.
//!
//! This module contains:
//! - EventStore: Append-only run journal
//! - Workflow: Workflow definitions and loading
//! - Safety: Safety limits and enforcement
//! - Engine: Step scheduling, retries and context commits

pub mod engine;
pub mod event_store;
pub mod safety;
pub mod workflow;

// Re-export commonly used types
pub use engine::{EngineOptions, RunReport, WorkflowEngine};
pub use event_store::EventStore;
pub use safety::{SafetyLimits, SafetyTracker, SafetyViolation};
pub use workflow::{RetryPolicy, TemplateBindings, WorkflowSpec, WorkflowStep};
