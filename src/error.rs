//! Error taxonomy surfaced in run reports.
//!
//! Each layer has its own `thiserror` enum; [`ErrorKind`] is the flat,
//! serializable classification the engine records for a failed step and uses
//! to decide whether a retry can help.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{AgentError, Role};
use crate::core::SafetyViolation;
use crate::domain::ContextError;

/// Classification of a step or run failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    UnknownAgent,
    InvalidDescriptor,
    TemplateNotFound,
    TemplateRender,
    FileExists,
    Io,
    Cancelled,
    InvalidInput,
    UnsupportedCapability,
    MissingOutput,
    Timeout,
    Context,
    Safety,
    AgentFailed,
}

impl ErrorKind {
    /// Whether retrying the same step with the same inputs may succeed.
    ///
    /// Configuration errors and cancellation never do.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            Self::InvalidDescriptor
                | Self::UnknownAgent
                | Self::MissingInput
                | Self::InvalidInput
                | Self::UnsupportedCapability
                | Self::TemplateNotFound
                | Self::Cancelled
                | Self::Context
                | Self::Safety
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::UnknownAgent => "unknown_agent",
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::TemplateNotFound => "template_not_found",
            Self::TemplateRender => "template_render",
            Self::FileExists => "file_exists",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid_input",
            Self::UnsupportedCapability => "unsupported_capability",
            Self::MissingOutput => "missing_output",
            Self::Timeout => "timeout",
            Self::Context => "context",
            Self::Safety => "safety",
            Self::AgentFailed => "agent_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single workflow step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step '{step}' is missing input keys: {}", keys.join(", "))]
    MissingInput { step: String, keys: Vec<String> },

    #[error("Step '{step}' targets role '{role}' but no agent is registered for it")]
    UnknownAgent { step: String, role: Role },

    #[error("Step '{step}' did not produce output '{key}'")]
    MissingOutput { step: String, key: String },

    #[error("Step '{step}' timed out after {seconds}s")]
    Timeout { step: String, seconds: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. } => ErrorKind::MissingInput,
            Self::UnknownAgent { .. } => ErrorKind::UnknownAgent,
            Self::MissingOutput { .. } => ErrorKind::MissingOutput,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context(_) => ErrorKind::Context,
            Self::Safety(_) => ErrorKind::Safety,
            Self::Agent(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
