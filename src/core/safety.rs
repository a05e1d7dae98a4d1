//! Safety limits and enforcement for workflow runs.
//!
//! Prevents runaway runs through configurable limits on:
//! - Number of steps
//! - Artifact sizes
//! - Step and run timeouts
//! - Denylisted write paths (so generated code never lands on secrets)

use std::path::Path;
use std::time::{Duration, Instant};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Artifact;

/// Safety limits for a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum number of steps per run (default: 50)
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Per-step timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,

    /// Total run timeout in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Maximum size of a single artifact in bytes (default: 10MB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,

    /// Glob patterns for paths that must never be written
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_max_steps() -> u32 {
    50
}
fn default_step_timeout() -> u64 {
    300
}
fn default_run_timeout() -> u64 {
    3600
}
fn default_max_artifact_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_timeout_seconds: default_step_timeout(),
            run_timeout_seconds: default_run_timeout(),
            max_artifact_bytes: default_max_artifact_bytes(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl SafetyLimits {
    /// Check if a path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(path))
    }

    /// Reject writes to denylisted paths
    pub fn validate_write_path(&self, path: &Path) -> Result<(), SafetyViolation> {
        let path_str = path.to_string_lossy();
        if self.is_denylisted(&path_str) {
            return Err(SafetyViolation::DenylistMatch {
                path: path_str.to_string(),
            });
        }
        Ok(())
    }

    /// Validate content about to be written against the size limit
    pub fn validate_content(&self, content: &str) -> Result<(), SafetyViolation> {
        let size = content.len() as u64;
        if size > self.max_artifact_bytes {
            return Err(SafetyViolation::MaxArtifactBytes {
                actual: size,
                limit: self.max_artifact_bytes,
            });
        }
        Ok(())
    }

    /// Validate an artifact before it is persisted under `base_path`
    pub fn validate_artifact(&self, artifact: &Artifact, base_path: &Path) -> Result<(), SafetyViolation> {
        self.validate_content(&artifact.content)?;
        if let Ok(relative) = artifact.relative_path() {
            self.validate_write_path(&base_path.join(relative))?;
        }
        Ok(())
    }

    /// Per-step timeout as a duration
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }

    /// Check current tracker state before scheduling `next_batch` more steps
    pub fn check(&self, tracker: &SafetyTracker, next_batch: u32) -> Result<(), SafetyViolation> {
        let projected = tracker.steps_executed + next_batch;
        if projected > self.max_steps {
            return Err(SafetyViolation::MaxSteps {
                actual: projected,
                limit: self.max_steps,
            });
        }

        let elapsed = tracker.elapsed_seconds();
        if elapsed >= self.run_timeout_seconds {
            return Err(SafetyViolation::RunTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.run_timeout_seconds,
            });
        }

        Ok(())
    }
}

/// Tracks resource usage during a run
#[derive(Debug, Clone)]
pub struct SafetyTracker {
    /// Number of steps executed
    pub steps_executed: u32,

    /// Total bytes of artifacts produced
    pub artifact_bytes: u64,

    /// When the run started
    pub started_at: Instant,
}

impl Default for SafetyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self {
            steps_executed: 0,
            artifact_bytes: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a finished step and the bytes of artifacts it produced
    pub fn record_step(&mut self, artifact_bytes: u64) {
        self.steps_executed += 1;
        self.artifact_bytes += artifact_bytes;
    }

    /// Get elapsed time in seconds
    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Safety violation errors
#[derive(Debug, Clone, Error)]
pub enum SafetyViolation {
    #[error("Maximum steps exceeded: {actual} > {limit}")]
    MaxSteps { actual: u32, limit: u32 },

    #[error("Maximum artifact bytes exceeded: {actual} > {limit}")]
    MaxArtifactBytes { actual: u64, limit: u64 },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },

    #[error("Path matches denylist pattern: {path}")]
    DenylistMatch { path: String },
}
