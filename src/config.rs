//! Configuration for devcrew paths, retries, safety limits and engine options.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DEVCREW_HOME, DEVCREW_OUTPUT, DEVCREW_TEMPLATES)
//! 2. Config file (.devcrew/config.yaml)
//! 3. Defaults (~/.devcrew, ./generated, built-in templates only)
//!
//! Config file discovery:
//! - Searches current directory and parents for .devcrew/config.yaml
//! - `paths.home` is relative to the .devcrew directory; `paths.output` and
//!   `paths.templates` are relative to the project root (its parent)

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::agents::AgentConfig;
use crate::core::{EngineOptions, RetryPolicy, SafetyLimits};
use crate::templates::builtin::builtin_source;
use crate::templates::{DirectorySource, LayeredSource, TemplateSource};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const HOME_ENV: &str = "DEVCREW_HOME";
pub const OUTPUT_ENV: &str = "DEVCREW_OUTPUT";
pub const TEMPLATES_ENV: &str = "DEVCREW_TEMPLATES";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub safety: SafetyLimits,
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub agents: AgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .devcrew/)
    pub home: Option<String>,
    /// Artifact output root (relative to the project root)
    pub output: Option<String>,
    /// Template directory (relative to the project root)
    pub templates: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Engine state (run journals live under `home/runs`)
    pub home: PathBuf,
    /// Where artifacts and written code land
    pub output: PathBuf,
    /// Extra template directory layered over the built-ins
    pub templates: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Default retry policy for workflows that do not set one
    pub retry: RetryPolicy,
    /// Default safety limits
    pub safety: SafetyLimits,
    pub engine: EngineOptions,
    pub agents: AgentConfig,
}

impl ResolvedConfig {
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Built-in templates, overlaid by the configured template directory
    pub fn template_source(&self) -> Result<Arc<dyn TemplateSource>> {
        let builtins: Arc<dyn TemplateSource> = Arc::new(builtin_source());

        let Some(dir) = &self.templates else {
            return Ok(builtins);
        };

        let directory = DirectorySource::scan(dir)
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
        Ok(Arc::new(
            LayeredSource::new()
                .with_layer(Arc::new(directory))
                .with_layer(builtins),
        ))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".devcrew").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    resolve(find_config_file(), |key| std::env::var(key).ok())
}

/// Combine an optional config file with environment lookups
fn resolve<F>(config_file: Option<PathBuf>, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".devcrew");
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let config = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // .devcrew/ and the project root above it
    let devcrew_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(cwd.as_path());
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(cwd.as_path());

    let home = match (env(HOME_ENV), &config.paths.home) {
        (Some(env_home), _) => PathBuf::from(env_home),
        (None, Some(home_path)) => resolve_path(devcrew_dir, home_path),
        (None, None) => default_home,
    };

    let output = match (env(OUTPUT_ENV), &config.paths.output) {
        (Some(env_output), _) => PathBuf::from(env_output),
        (None, Some(output_path)) => resolve_path(base_dir, output_path),
        (None, None) => cwd.join("generated"),
    };

    let templates = match (env(TEMPLATES_ENV), &config.paths.templates) {
        (Some(env_templates), _) => Some(PathBuf::from(env_templates)),
        (None, Some(templates_path)) => Some(resolve_path(base_dir, templates_path)),
        (None, None) => None,
    };

    Ok(ResolvedConfig {
        home,
        output,
        templates,
        config_file,
        retry: config.retry,
        safety: config.safety,
        engine: config.engine,
        agents: config.agents,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the devcrew home directory (engine state).
pub fn devcrew_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($DEVCREW_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.runs_dir())
}

/// Get the artifact output root
pub fn output_dir() -> Result<PathBuf> {
    Ok(config()?.output.clone())
}
