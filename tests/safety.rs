//! Safety Limits Integration Tests
//!
//! Tests for safety limit enforcement, denylist patterns and the way
//! write_code and artifact persistence honour them.

use std::path::Path;

use devcrew::agents::{write_code, AgentError};
use devcrew::core::{SafetyLimits, SafetyTracker, SafetyViolation, WorkflowSpec};
use devcrew::domain::{Artifact, ArtifactKind, Language};
use tempfile::TempDir;

#[test]
fn test_max_artifact_bytes() {
    let limits = SafetyLimits {
        max_artifact_bytes: 100,
        ..Default::default()
    };

    assert!(limits.validate_content(&"x".repeat(50)).is_ok());
    assert!(limits.validate_content(&"x".repeat(100)).is_ok());

    match limits.validate_content(&"x".repeat(200)) {
        Err(SafetyViolation::MaxArtifactBytes { actual, limit }) => {
            assert_eq!(actual, 200);
            assert_eq!(limit, 100);
        }
        other => panic!("Expected MaxArtifactBytes violation, got {:?}", other),
    }
}

#[test]
fn test_denylist_pattern_env() {
    let limits = SafetyLimits::default();

    assert!(limits.is_denylisted(".env"));
    assert!(limits.is_denylisted(".env.local"));
    assert!(limits.is_denylisted("config/.env"));
}

#[test]
fn test_denylist_pattern_secrets_and_keys() {
    let limits = SafetyLimits::default();

    assert!(limits.is_denylisted("secrets.yaml"));
    assert!(limits.is_denylisted("config/secrets.yaml"));
    assert!(limits.is_denylisted("credentials.json"));
    assert!(limits.is_denylisted("user_credentials.txt"));
    assert!(limits.is_denylisted("server.pem"));
    assert!(limits.is_denylisted("ssl/domain.key"));

    // **/secrets* only matches names that start with "secrets"
    assert!(!limits.is_denylisted("my-secrets-file"));
}

#[test]
fn test_denylist_allows_generated_sources() {
    let limits = SafetyLimits::default();

    assert!(!limits.is_denylisted("factorial.py"));
    assert!(!limits.is_denylisted("src/calculator.py"));
    assert!(!limits.is_denylisted("tests/test_factorial.py"));
    assert!(!limits.is_denylisted("docs/calculator.md"));
}

#[test]
fn test_write_code_refuses_denylisted_path() {
    let temp = TempDir::new().unwrap();
    let limits = SafetyLimits::default();

    let result = write_code(temp.path(), "config/.env", "TOKEN=1", false, &limits);

    assert!(matches!(result, Err(AgentError::Safety(_))));
    assert!(!temp.path().join("config/.env").exists());
}

#[test]
fn test_write_code_refuses_paths_outside_root() {
    let temp = TempDir::new().unwrap();
    let limits = SafetyLimits::default();

    for path in ["../escape.py", "/etc/escape.py", ""] {
        let result = write_code(temp.path(), path, "x = 1\n", false, &limits);
        assert!(
            matches!(result, Err(AgentError::InvalidInput(_))),
            "path {:?} was accepted",
            path
        );
    }
}

#[test]
fn test_validate_artifact_checks_derived_path() {
    let limits = SafetyLimits {
        denylist_patterns: vec!["**/src/generated_*".to_string()],
        ..Default::default()
    };
    let base = Path::new("/tmp/out");

    let blocked = Artifact::new("generated_models", "x = 1\n", ArtifactKind::Module, Language::Python);
    assert!(matches!(
        limits.validate_artifact(&blocked, base),
        Err(SafetyViolation::DenylistMatch { .. })
    ));

    let allowed = Artifact::new("models", "x = 1\n", ArtifactKind::Module, Language::Python);
    assert!(limits.validate_artifact(&allowed, base).is_ok());
}

#[test]
fn test_max_steps_enforcement() {
    let limits = SafetyLimits {
        max_steps: 3,
        ..Default::default()
    };

    let mut tracker = SafetyTracker::new();
    assert!(limits.check(&tracker, 1).is_ok());

    tracker.record_step(100);
    tracker.record_step(100);
    assert!(limits.check(&tracker, 1).is_ok());

    // A batch of two would overshoot the limit
    match limits.check(&tracker, 2) {
        Err(SafetyViolation::MaxSteps { actual, limit }) => {
            assert_eq!(actual, 4);
            assert_eq!(limit, 3);
        }
        other => panic!("Expected MaxSteps violation, got {:?}", other),
    }

    tracker.record_step(0);
    assert!(limits.check(&tracker, 1).is_err());
}

#[test]
fn test_run_timeout_enforcement() {
    let limits = SafetyLimits {
        run_timeout_seconds: 0,
        ..Default::default()
    };

    let result = limits.check(&SafetyTracker::new(), 1);
    assert!(matches!(result, Err(SafetyViolation::RunTimeout { .. })));
}

#[test]
fn test_safety_tracker_recording() {
    let mut tracker = SafetyTracker::new();
    assert_eq!(tracker.steps_executed, 0);
    assert_eq!(tracker.artifact_bytes, 0);

    tracker.record_step(200);
    tracker.record_step(400);

    assert_eq!(tracker.steps_executed, 2);
    assert_eq!(tracker.artifact_bytes, 600);
}

#[test]
fn test_custom_denylist_patterns() {
    let limits = SafetyLimits {
        denylist_patterns: vec!["**/*.secret".to_string(), "**/private/*".to_string()],
        ..Default::default()
    };

    assert!(limits.is_denylisted("config.secret"));
    assert!(limits.is_denylisted("data/private/notes.txt"));

    // Default patterns are replaced, not extended
    assert!(!limits.is_denylisted(".env"));
}

#[test]
fn test_safety_limits_yaml_parsing() {
    let yaml = r#"
name: safety_test
description: Test safety limits

safety_limits:
  max_steps: 10
  step_timeout_seconds: 60
  run_timeout_seconds: 600
  max_artifact_bytes: 2097152
  denylist_patterns:
    - "**/*.password"
    - "**/api_keys/*"

steps:
  - id: analyze
    agent: architect
"#;

    let spec = WorkflowSpec::from_yaml(yaml).unwrap();

    assert_eq!(spec.safety_limits.max_steps, 10);
    assert_eq!(spec.safety_limits.step_timeout_seconds, 60);
    assert_eq!(spec.safety_limits.run_timeout_seconds, 600);
    assert_eq!(spec.safety_limits.max_artifact_bytes, 2097152);
    assert_eq!(spec.safety_limits.denylist_patterns.len(), 2);
}

#[test]
fn test_safety_limits_default_values() {
    let limits = SafetyLimits::default();

    assert_eq!(limits.max_steps, 50);
    assert_eq!(limits.max_artifact_bytes, 10 * 1024 * 1024);
    assert_eq!(limits.step_timeout_seconds, 300);
    assert_eq!(limits.run_timeout_seconds, 3600);
}
