//! Run journal events.
//!
//! Every state change during a workflow run is recorded as an immutable event
//! in an append-only log, so a run summary can be rebuilt by replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::TaskStatus;
use crate::error::ErrorKind;

/// A single event in the run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Step id (if applicable)
    pub step_id: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary
    pub payload_summary: String,

    /// Task status after this event
    pub status: TaskStatus,

    /// Attempt number (1-based) for step events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    /// Time taken in milliseconds (for finished steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error classification if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        step_id: Option<String>,
        event_type: EventType,
        payload_summary: String,
        status: TaskStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            step_id,
            event_type,
            payload_summary,
            status,
            attempt: None,
            duration_ms: None,
            error: None,
            error_kind: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, kind: ErrorKind, error: String) -> Self {
        self.error_kind = Some(kind);
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// A run completed successfully
    RunCompleted,

    /// A run halted on a failed step
    RunFailed,

    /// A run was cancelled from outside
    RunCancelled,

    /// A step has started execution
    StepStarted,

    /// A step attempt failed and will be retried
    StepRetrying,

    /// A step completed successfully
    StepCompleted,

    /// A step failed permanently
    StepFailed,

    /// An artifact was written to disk
    ArtifactPersisted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("generate_code".to_string()),
            EventType::StepStarted,
            "Starting generate_code".to_string(),
            TaskStatus::InProgress,
        )
        .with_attempt(1);

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::StepStarted);
        assert_eq!(parsed.status, TaskStatus::InProgress);
        assert_eq!(parsed.attempt, Some(1));
        assert!(!json.contains("duration_ms"));
    }

    #[test]
    fn test_event_with_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("write_code".to_string()),
            EventType::StepFailed,
            "Failed write_code".to_string(),
            TaskStatus::Failed,
        )
        .with_duration(12)
        .with_error(ErrorKind::FileExists, "File already exists: a.py".to_string());

        assert_eq!(event.duration_ms, Some(12));
        assert_eq!(event.error_kind, Some(ErrorKind::FileExists));
        assert_eq!(event.error.as_deref(), Some("File already exists: a.py"));
    }
}
