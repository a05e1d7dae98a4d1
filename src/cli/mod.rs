//! Command-line interface for devcrew.
//!
//! Provides commands for running workflows, checking run status,
//! listing runs and inspecting templates and configuration.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::codegen::CodeGenerator;
use crate::config::{self, ResolvedConfig};
use crate::core::{EventStore, RetryPolicy, RunReport, SafetyLimits, WorkflowEngine, WorkflowSpec};
use crate::domain::{ProjectContext, ProjectMetadata, Run, RunState};
use crate::error::ErrorKind;

/// devcrew - a workflow engine for a team of development agents
#[derive(Parser, Debug)]
#[command(name = "devcrew")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow
    Run {
        /// Path to the workflow YAML file
        workflow: PathBuf,

        /// Requirements file (reads piped stdin if neither this nor --requirements is given)
        #[arg(short, long, conflicts_with = "requirements")]
        input: Option<PathBuf>,

        /// Requirements text
        #[arg(short, long)]
        requirements: Option<String>,

        /// Output directory for written code and artifacts
        #[arg(short, long, env = "DEVCREW_OUTPUT")]
        output: Option<PathBuf>,

        /// Run consecutive independent steps concurrently
        #[arg(long)]
        parallel: bool,

        /// Save every produced artifact under the output directory
        #[arg(long)]
        persist: bool,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List available templates
    Templates,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                workflow,
                input,
                requirements,
                output,
                parallel,
                persist,
            } => {
                let requirements = read_requirements(input, requirements)?;
                run_workflow(&workflow, requirements, output, parallel, persist).await
            }
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Templates => list_templates(),
            Commands::Config => show_config(),
        }
    }
}

/// Requirements from a file, the command line, or piped stdin
fn read_requirements(input: Option<PathBuf>, text: Option<String>) -> Result<Option<String>> {
    let requirements = if let Some(path) = input {
        Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        )
    } else if text.is_some() {
        text
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Some(buffer)
    } else {
        None
    };

    Ok(requirements.filter(|r| !r.trim().is_empty()))
}

/// Run a workflow file and report the outcome
async fn run_workflow(
    workflow_path: &Path,
    requirements: Option<String>,
    output: Option<PathBuf>,
    parallel: bool,
    persist: bool,
) -> Result<()> {
    let cfg = config::config()?;

    let mut spec = WorkflowSpec::from_file(workflow_path)?;
    spec.validate()
        .with_context(|| format!("Invalid workflow: {}", workflow_path.display()))?;
    apply_config_defaults(&mut spec, cfg);

    let workflow_dir = workflow_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let templates = spec
        .templates
        .source(&workflow_dir, cfg.template_source()?)
        .context("Failed to load workflow templates")?;
    let generator = Arc::new(CodeGenerator::new(templates));

    let mut options = cfg.engine.clone();
    options.parallel |= parallel;
    options.persist_artifacts |= persist;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let engine = WorkflowEngine::new(AgentRegistry::team_with_config(generator, cfg.agents.clone()))
        .with_options(options)
        .with_journal(cfg.runs_dir())
        .with_cancellation(cancel);

    let output_root = output.unwrap_or_else(|| cfg.output.clone());
    let project = ProjectMetadata {
        requirements: requirements.unwrap_or_default(),
        ..Default::default()
    };
    let context = ProjectContext::new(project, output_root);

    let report = engine.run(&spec, context).await?;
    print_report(&spec, &report);

    if !report.is_completed() {
        std::process::exit(1);
    }

    Ok(())
}

/// Use the configured retry policy and safety limits where the workflow
/// leaves them at their defaults
fn apply_config_defaults(spec: &mut WorkflowSpec, cfg: &ResolvedConfig) {
    if spec.retry_policy == RetryPolicy::default() {
        spec.retry_policy = cfg.retry.clone();
    }
    if spec.safety_limits == SafetyLimits::default() {
        spec.safety_limits = cfg.safety.clone();
    }
}

fn print_report(spec: &WorkflowSpec, report: &RunReport) {
    // Final step output goes to stdout, everything else to stderr
    let last_value = spec
        .steps
        .iter()
        .rev()
        .filter(|s| report.task_status(&s.id).is_some_and(|st| st.is_terminal()))
        .flat_map(|s| s.outputs.iter().rev())
        .find_map(|key| report.context.value(key));
    if let Some(value) = last_value {
        match value {
            Value::String(text) => println!("{}", text),
            other => println!(
                "{}",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }

    eprintln!("\nSteps:");
    for step in &spec.steps {
        let status = report
            .task_status(&step.id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "  {:<24} {:<12} attempts: {}",
            step.id,
            status,
            report.attempts(&step.id)
        );
    }

    if !report.context.artifacts().is_empty() {
        eprintln!("\nArtifacts:");
        for (name, artifact) in report.context.artifacts() {
            eprintln!("  {} ({:?}, {} bytes)", name, artifact.kind, artifact.size_bytes());
        }
    }
    for path in &report.persisted {
        eprintln!("  wrote {}", path.display());
    }

    match report.failure() {
        None => eprintln!("\n[Run {} completed successfully]", report.run_id()),
        Some((step_id, kind, error)) => eprintln!(
            "\n[Run {} failed at {} ({}): {}]",
            report.run_id(),
            step_id.unwrap_or("-"),
            kind,
            error
        ),
    }
}

async fn load_run(run_id: Uuid) -> Result<Run> {
    let store = EventStore::open_in(&config::runs_dir()?, run_id).await?;
    store
        .load_run()
        .await?
        .with_context(|| format!("Run not found: {}", run_id))
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let run = load_run(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Workflow: {}", run.workflow_name);
    println!("State: {}", state_label(&run.state));
    if let Some((step_id, kind, error)) = run.failure() {
        println!("Failed at: {} ({})", step_id.unwrap_or("-"), kind);
        println!("Error: {}", error);
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("\nStep statuses:");
    for (step, status) in &run.step_statuses {
        let attempts = run.attempts.get(step).copied().unwrap_or(0);
        println!("  {}: {} (attempts: {})", step, status, attempts);
    }

    Ok(())
}

fn state_label(state: &RunState) -> &'static str {
    match state {
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::Failed { kind: ErrorKind::Cancelled, .. } => "cancelled",
        RunState::Failed { .. } => "failed",
    }
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let runs_dir = config::runs_dir()?;
    let mut runs = Vec::new();
    for run_id in EventStore::list_runs_in(&runs_dir).await? {
        match EventStore::open_in(&runs_dir, run_id).await?.load_run().await {
            Ok(Some(run)) => runs.push(run),
            Ok(None) => {}
            Err(e) => warn!(%run_id, error = %e, "Skipping unreadable run journal"),
        }
    }

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    println!("{:<38} {:<20} {:<10} {}", "RUN ID", "WORKFLOW", "STATE", "STARTED");
    println!("{}", "-".repeat(90));

    for run in runs.into_iter().take(limit) {
        println!(
            "{:<38} {:<20} {:<10} {}",
            run.id,
            run.workflow_name,
            state_label(&run.state),
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// List the templates visible with the current configuration
fn list_templates() -> Result<()> {
    let cfg = config::config()?;
    let names = cfg.template_source()?.names();

    if names.is_empty() {
        println!("No templates found");
        return Ok(());
    }

    for name in names {
        println!("{}", name);
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("devcrew configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Runs:                {}", cfg.runs_dir().display());
    println!("  Output:              {}", cfg.output.display());
    println!(
        "  Templates:           {}",
        cfg.templates
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-ins only)".to_string())
    );
    println!();
    println!("Engine:");
    println!("  Parallel:            {}", cfg.engine.parallel);
    println!("  Persist artifacts:   {}", cfg.engine.persist_artifacts);
    println!("  Overwrite artifacts: {}", cfg.engine.overwrite_artifacts);
    println!();
    println!("Retry policy:");
    println!("  Max retries:    {}", cfg.retry.max_retries);
    println!("  Initial delay:  {}ms", cfg.retry.initial_delay_ms);
    println!("  Max delay:      {}ms", cfg.retry.max_delay_ms);
    println!("  Multiplier:     {}", cfg.retry.backoff_multiplier);
    println!();
    println!("Safety limits:");
    println!("  Max steps:         {}", cfg.safety.max_steps);
    println!("  Step timeout:      {}s", cfg.safety.step_timeout_seconds);
    println!("  Run timeout:       {}s", cfg.safety.run_timeout_seconds);
    println!("  Max artifact size: {} bytes", cfg.safety.max_artifact_bytes);
    println!();
    println!("Agents:");
    println!("  Language: {:?}", cfg.agents.language);

    Ok(())
}
