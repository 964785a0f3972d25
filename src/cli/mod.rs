//! Command-line interface for infracompare.
//!
//! Provides commands for starting a comparison, advancing or resuming it
//! one stage at a time, inspecting its outputs, and housekeeping.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::adapters::InfracostEstimator;
use crate::config::{self, ResolvedConfig};
use crate::core::{ArtifactStore, CancelSignal, Canceller, EventStore, PipelineEngine, RunLock};
use crate::domain::{Field, FieldView, RunState, Stage};
use crate::error::PipelineError;

/// infracompare - Compare AWS and Azure costs for an infrastructure requirement
#[derive(Parser, Debug)]
#[command(name = "infracompare")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new comparison and drive it to completion
    Run {
        /// Requirement text (reads --input or stdin if not provided)
        text: Option<String>,

        /// Read the requirement from a file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Keep the previous run's plans and journal
        #[arg(long)]
        keep_previous: bool,
    },

    /// Perform exactly one stage of a run
    Advance {
        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Drive a run to completion from its checkpoint
    Resume {
        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Show the stage and output readiness of a run
    Status {
        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Print one output of a run
    Show {
        /// Output to print
        #[arg(value_enum)]
        field: ShowField,

        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Reset a run to its initial stage, discarding every output
    Restart {
        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Delete a run's plans and journal
    Clean {
        /// Run ID (defaults to the current run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Check that the external tools are usable
    Check,
}

/// Outputs printable with `show`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShowField {
    AwsPlan,
    AzurePlan,
    AwsAnalysis,
    AzureAnalysis,
    AwsCost,
    AzureCost,
    AwsCostRaw,
    AzureCostRaw,
    /// Both cost analyses side by side
    CostSummary,
    Comparison,
    FinalAnalysis,
}

impl ShowField {
    /// Run fields printed for this output
    pub fn fields(&self) -> &'static [Field] {
        match self {
            ShowField::AwsPlan => &[Field::AwsPlan],
            ShowField::AzurePlan => &[Field::AzurePlan],
            ShowField::AwsAnalysis => &[Field::AwsPlanSummary],
            ShowField::AzureAnalysis => &[Field::AzurePlanSummary],
            ShowField::AwsCost => &[Field::AwsCostSummary],
            ShowField::AzureCost => &[Field::AzureCostSummary],
            ShowField::AwsCostRaw => &[Field::AwsCostRaw],
            ShowField::AzureCostRaw => &[Field::AzureCostRaw],
            ShowField::CostSummary => &[Field::AwsCostSummary, Field::AzureCostSummary],
            ShowField::Comparison => &[Field::ComparisonText],
            ShowField::FinalAnalysis => &[Field::FinalSummary],
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                text,
                input,
                keep_previous,
            } => start_run(text, input, keep_previous).await,
            Commands::Advance { run } => advance_run(run.as_deref()).await,
            Commands::Resume { run } => resume_run(run.as_deref()).await,
            Commands::Status { run } => show_status(run.as_deref()).await,
            Commands::Show { field, run } => show_field(field, run.as_deref()).await,
            Commands::Restart { run } => restart_run(run.as_deref()).await,
            Commands::Clean { run } => clean_run(run.as_deref()).await,
            Commands::Config => show_config(),
            Commands::Check => check_tools().await,
        }
    }
}

/// Create a run from the requirement and drive it to completion
async fn start_run(text: Option<String>, input: Option<PathBuf>, keep_previous: bool) -> Result<()> {
    let requirement = read_requirement(text, input)?;

    let cfg = config::config()?;
    let runs_root = cfg.runs_dir();
    let engine = PipelineEngine::from_config(cfg)?;

    let previous = EventStore::current_run(&runs_root).await?;

    let mut run = engine.create_run(requirement).await?;
    let _lock = lock_run(&runs_root, run.run_id())?;
    EventStore::set_current_run(&runs_root, run.run_id()).await?;

    eprintln!("[Run {} created]", run.run_id());

    if let Some(previous) = previous.filter(|id| !keep_previous && *id != run.run_id()) {
        if let Some(_previous_lock) = claim_previous(&runs_root, previous) {
            engine.delete_run(previous).await?;
            tracing::debug!(run_id = %previous, "Removed previous run");
        }
    }

    drive(&engine, &mut run).await
}

/// Perform one stage of a run
async fn advance_run(run_arg: Option<&str>) -> Result<()> {
    let cfg = config::config()?;
    let runs_root = cfg.runs_dir();
    let run_id = resolve_run_id(&runs_root, run_arg).await?;
    let engine = PipelineEngine::from_config(cfg)?;

    let _lock = lock_run(&runs_root, run_id)?;
    let mut run = load_run(&runs_root, run_id).await?;

    if run.is_complete() {
        eprintln!("[Run {} is already complete]", run_id);
        return Ok(());
    }

    match engine.advance_with(&mut run, &cancel_on_ctrl_c()).await {
        Ok(stage) => {
            eprintln!("[Run {} reached {}]", run_id, stage);
            if let Some(next) = run.pending_transition() {
                eprintln!("Next: {}", next.activity());
            }
            Ok(())
        }
        Err(e) => report_failure(&run, e),
    }
}

/// Drive a run to completion from its checkpoint
async fn resume_run(run_arg: Option<&str>) -> Result<()> {
    let cfg = config::config()?;
    let runs_root = cfg.runs_dir();
    let run_id = resolve_run_id(&runs_root, run_arg).await?;
    let engine = PipelineEngine::from_config(cfg)?;

    let _lock = lock_run(&runs_root, run_id)?;
    let mut run = load_run(&runs_root, run_id).await?;

    eprintln!("[Resuming run {} from {}]", run_id, run.checkpoint());
    drive(&engine, &mut run).await
}

async fn drive(engine: &PipelineEngine, run: &mut RunState) -> Result<()> {
    let cancel = cancel_on_ctrl_c();

    let result = engine
        .run_to_completion(run, &cancel, |run| {
            eprintln!("  ✓ {}", run.stage());
        })
        .await;

    match result {
        Ok(_) => {
            if let Some(summary) = run.final_summary() {
                println!("{}", summary);
            }
            eprintln!("\n[Run {} completed successfully]", run.run_id());
            Ok(())
        }
        Err(e) => report_failure(run, e),
    }
}

fn report_failure(run: &RunState, error: PipelineError) -> Result<()> {
    if let PipelineError::Cancelled(transition) = error {
        eprintln!(
            "\n[Run {} cancelled during {}; still at {}]",
            run.run_id(),
            transition,
            run.checkpoint()
        );
    } else {
        eprintln!("\n[Run {} failed: {}]", run.run_id(), error);
        if error.is_retryable() {
            eprintln!("Retry with: infracompare resume --run {}", run.run_id());
        }
    }
    std::process::exit(1);
}

/// Show the status of a run
async fn show_status(run_arg: Option<&str>) -> Result<()> {
    let runs_root = config::runs_dir()?;
    let run_id = resolve_run_id(&runs_root, run_arg).await?;
    let run = load_run(&runs_root, run_id).await?;

    println!("Run ID:     {}", run.run_id());
    println!("Created:    {}", run.created_at());
    println!("Updated:    {}", run.updated_at());
    println!("Stage:      {}", run.stage());
    println!("Checkpoint: {}", run.checkpoint());

    if let Some(failure) = run.failure() {
        println!(
            "Failure:    {} ({}) at {}: {}",
            failure.transition, failure.kind, failure.failed_at, failure.message
        );
    }
    if let Some(next) = run.pending_transition() {
        println!("Next:       {}", next.activity());
    }

    println!("\nOutputs:");
    for field in Field::ALL {
        let state = match run.view(field) {
            FieldView::Pending => "pending".to_string(),
            FieldView::Failed(_) => "failed".to_string(),
            FieldView::Ready(value) => format!("ready ({} bytes)", value.len()),
        };
        println!("  {:<30} {}", field.label(), state);
    }

    Ok(())
}

/// Print one output of a run
async fn show_field(field: ShowField, run_arg: Option<&str>) -> Result<()> {
    let runs_root = config::runs_dir()?;
    let run_id = resolve_run_id(&runs_root, run_arg).await?;
    let run = load_run(&runs_root, run_id).await?;

    let fields = field.fields();
    for (idx, field) in fields.iter().enumerate() {
        let value = match run.view(*field) {
            FieldView::Ready(value) => value,
            FieldView::Pending => anyhow::bail!(
                "{} not available yet (run is at {})",
                field.label(),
                run.stage()
            ),
            FieldView::Failed(failure) => anyhow::bail!(
                "{} unavailable: {} failed: {}",
                field.label(),
                failure.transition,
                failure.message
            ),
        };

        if fields.len() > 1 {
            if idx > 0 {
                println!();
            }
            println!("== {} ==", field.label());
        }
        println!("{}", value);
    }

    Ok(())
}

/// Reset a run to its initial stage
async fn restart_run(run_arg: Option<&str>) -> Result<()> {
    let cfg = config::config()?;
    let runs_root = cfg.runs_dir();
    let run_id = resolve_run_id(&runs_root, run_arg).await?;
    let engine = PipelineEngine::from_config(cfg)?;

    let _lock = lock_run(&runs_root, run_id)?;
    let mut run = load_run(&runs_root, run_id).await?;

    engine.restart(&mut run).await?;
    eprintln!("[Run {} reset to {}]", run_id, Stage::Created);

    Ok(())
}

/// Delete a run's plans and journal
async fn clean_run(run_arg: Option<&str>) -> Result<()> {
    let runs_root = config::runs_dir()?;
    let run_id = resolve_run_id(&runs_root, run_arg).await?;

    {
        let _lock = lock_run(&runs_root, run_id)?;
        ArtifactStore::new(config::artifacts_dir()?)
            .remove_run(run_id)
            .await?;
    }
    EventStore::locate(&runs_root, run_id).remove().await?;

    if EventStore::current_run(&runs_root).await? == Some(run_id) {
        EventStore::clear_current_run(&runs_root).await?;
    }

    eprintln!("[Run {} removed]", run_id);
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;
    print_config(cfg);
    Ok(())
}

fn print_config(cfg: &ResolvedConfig) {
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
    println!("  Terraform plans:     {}", cfg.artifacts.display());
    println!();
    println!("OpenAI:");
    println!("  Base URL:         {}", cfg.openai.base_url);
    println!("  Plan model:       {}", cfg.openai.plan_model);
    println!("  Comparison model: {}", cfg.openai.comparison_model);
    println!("  Summary model:    {}", cfg.openai.summary_model);
    println!(
        "  API key:          {}",
        if cfg.openai.api_key.is_some() { "set" } else { "missing" }
    );
    println!();
    println!("Infracost:");
    println!("  Binary: {}", cfg.infracost.binary);
    println!();
    println!("Limits:");
    println!("  Call timeout:        {}s", cfg.limits.call_timeout_seconds);
    println!("  Max requirement:     {} bytes", cfg.limits.max_requirement_bytes);
    println!("  Max output:          {} bytes", cfg.limits.max_output_bytes);
    println!("  Parallel providers:  {}", cfg.limits.parallel_providers);
}

/// Check that the external tools are usable
async fn check_tools() -> Result<()> {
    let cfg = config::config()?;
    let mut healthy = true;

    match InfracostEstimator::from_config(cfg).health_check().await {
        Ok(version) => println!("infracost: ok ({})", version),
        Err(e) => {
            healthy = false;
            println!("infracost: unavailable ({})", e);
        }
    }

    if cfg.openai.api_key.is_some() {
        println!("openai:    api key set");
    } else {
        healthy = false;
        println!("openai:    api key missing (set OPENAI_API_KEY)");
    }

    if !healthy {
        anyhow::bail!("Some tools are not ready");
    }

    Ok(())
}

/// Requirement from the argument, a file, or piped stdin
fn read_requirement(text: Option<String>, input: Option<PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }

    if let Some(path) = input {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No requirement provided. Pass it as an argument, use --input <file>, or pipe to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Explicit run id, or the current run
async fn resolve_run_id(runs_root: &Path, run_arg: Option<&str>) -> Result<Uuid> {
    match run_arg {
        Some(id) => Uuid::parse_str(id).with_context(|| format!("Invalid run ID: {}", id)),
        None => EventStore::current_run(runs_root)
            .await?
            .context("No current run. Start one with `infracompare run`"),
    }
}

async fn load_run(runs_root: &Path, run_id: Uuid) -> Result<RunState> {
    EventStore::locate(runs_root, run_id)
        .load_state()
        .await?
        .with_context(|| format!("Run {} not found", run_id))
}

fn lock_run(runs_root: &Path, run_id: Uuid) -> Result<RunLock> {
    let store = EventStore::locate(runs_root, run_id);
    if !store.run_dir().exists() {
        anyhow::bail!("Run {} not found", run_id);
    }

    store
        .lock()
        .with_context(|| format!("Run {} is in use by another process", run_id))
}

/// Lock a previous run for removal.
///
/// `None` when it is already gone or another process is driving it.
fn claim_previous(runs_root: &Path, previous: Uuid) -> Option<RunLock> {
    if !EventStore::exists(runs_root, previous) {
        tracing::debug!(run_id = %previous, "Previous run already removed");
        return None;
    }

    match lock_run(runs_root, previous) {
        Ok(lock) => Some(lock),
        Err(e) => {
            tracing::warn!(run_id = %previous, error = %e, "Previous run still in use");
            None
        }
    }
}

/// Cancellation signal fired by Ctrl+C
fn cancel_on_ctrl_c() -> CancelSignal {
    let (canceller, signal) = Canceller::new();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            canceller.cancel();
        }
    });

    signal
}
