//! Run state and reconstruction from events.
//!
//! A Run summarises a single execution of a workflow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::TaskStatus;
use super::events::{Event, EventType};
use crate::error::ErrorKind;

/// A workflow execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name of the workflow being executed
    pub workflow_name: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Status of each step (step id -> status)
    pub step_statuses: BTreeMap<String, TaskStatus>,

    /// Number of attempts made per step
    pub attempts: BTreeMap<String, u32>,
}

impl Run {
    /// Create a new run for a workflow
    pub fn new(id: Uuid, workflow_name: String) -> Self {
        Self {
            id,
            workflow_name,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            step_statuses: BTreeMap::new(),
            attempts: BTreeMap::new(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id, String::new());
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
                if let Some(name) = event.payload_summary.strip_prefix("workflow:") {
                    self.workflow_name = name.to_string();
                }
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed | EventType::RunCancelled => {
                self.state = RunState::Failed {
                    step_id: event.step_id.clone(),
                    kind: event.error_kind.unwrap_or(ErrorKind::Cancelled),
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StepStarted | EventType::StepRetrying => {
                if let Some(ref step_id) = event.step_id {
                    self.step_statuses
                        .insert(step_id.clone(), TaskStatus::InProgress);
                    if let Some(attempt) = event.attempt {
                        self.attempts.insert(step_id.clone(), attempt);
                    }
                }
            }
            EventType::StepCompleted => {
                if let Some(ref step_id) = event.step_id {
                    self.step_statuses.insert(step_id.clone(), TaskStatus::Done);
                }
            }
            EventType::StepFailed => {
                if let Some(ref step_id) = event.step_id {
                    self.step_statuses.insert(step_id.clone(), TaskStatus::Failed);
                }
            }
            EventType::ArtifactPersisted => {}
        }
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Whether every step finished and the run completed
    pub fn is_completed(&self) -> bool {
        matches!(self.state, RunState::Completed)
    }

    /// Failure details, if the run halted
    pub fn failure(&self) -> Option<(Option<&str>, ErrorKind, &str)> {
        match &self.state {
            RunState::Failed {
                step_id,
                kind,
                error,
            } => Some((step_id.as_deref(), *kind, error.as_str())),
            _ => None,
        }
    }
}

/// State of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    Running,

    /// All steps reached `done`
    Completed,

    /// Halted on the first unrecoverable step (or cancelled, with kind `cancelled`)
    Failed {
        step_id: Option<String>,
        kind: ErrorKind,
        error: String,
    },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
