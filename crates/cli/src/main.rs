//! Cadence CLI entry point.
//!
//! This binary is the composition root for the whole system:
//!
//! 1. **Parse configuration**: load `.cadence/config.toml` (or `--config`).
//! 2. **Wire observability**: `tracing-subscriber` with a human or JSON layer
//!    and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: the file-backed memory store and the
//!    output writer, injected into a [`WorkflowCoordinator`] over the default
//!    agent registry.
//! 4. **Dispatch the subcommand**.
//!
//! Exit codes: `0` success, `1` workflow failure or internal error, `2` input
//! rejected before the run started.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use nodes::{default_registry, WorkflowCoordinator};
use pipeline::{
    ErrorKind, FailureRecord, MemoryStore, WorkflowInput, WorkflowOutput, MEMORY_RECORD_VERSION,
};
use storage::{FileMemoryStore, OutputWriter};

use crate::config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Multi-agent content workflow coordinator")]
struct Cli {
    /// Configuration file.
    #[arg(
        long,
        global = true,
        env = "CADENCE_CONFIG",
        default_value = ".cadence/config.toml"
    )]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one content workflow.
    Run(RunArgs),
    /// Print the resolved agent order.
    Agents,
    /// Print the persisted memory record.
    Memory,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// The content idea to develop.
    #[arg(long)]
    idea: String,

    /// Target platform; repeat two or three times.
    #[arg(long = "platform", required = true)]
    platforms: Vec<String>,

    /// Intended audience.
    #[arg(long)]
    audience: Option<String>,

    /// Print the full JSON record instead of a summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let telemetry = match telemetry::init(&config, cli.verbose) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match dispatch(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    };

    telemetry.shutdown();
    code
}

async fn dispatch(command: Command, config: &CliConfig) -> anyhow::Result<ExitCode> {
    match command {
        Command::Run(args) => run_workflow(args, config).await,
        Command::Agents => {
            print_agents()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Memory => {
            print_memory(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_workflow(args: RunArgs, config: &CliConfig) -> anyhow::Result<ExitCode> {
    let registry = default_registry().context("failed to build agent registry")?;
    let memory: Arc<dyn MemoryStore> = Arc::new(FileMemoryStore::new(&config.memory_path));
    let coordinator = WorkflowCoordinator::new(Arc::new(registry), memory)
        .with_config(config.coordinator_config());
    let writer = OutputWriter::new(&config.output_dir);

    let input = WorkflowInput::new(args.idea, args.platforms, args.audience);
    match coordinator.run(&input).await {
        Ok(output) => {
            let path = writer
                .write_output(&output)
                .await
                .context("failed to write output record")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_output(&output);
                println!("record: {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            // The failure is the primary result; a write error must not mask it.
            let written = writer.write_failure(&failure).await;
            if let Err(e) = &written {
                tracing::warn!(error = %e, "failed to write failure record");
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                print_failure(&failure);
                if let Ok(path) = written {
                    println!("record: {}", path.display());
                }
            }
            Ok(ExitCode::from(exit_status(&failure)))
        }
    }
}

fn exit_status(failure: &FailureRecord) -> u8 {
    match failure.kind {
        ErrorKind::InputValidation => 2,
        _ => 1,
    }
}

fn print_output(output: &WorkflowOutput) {
    println!("workflow {} succeeded", output.workflow_id);
    if let Some(title) = output.core_content.get("title").and_then(|t| t.as_str()) {
        println!("title: {title}");
    }
    for (platform, adaptation) in &output.adaptations {
        let chars = adaptation.get("char_count").and_then(|c| c.as_u64()).unwrap_or(0);
        println!("  {platform}: {chars} chars");
    }
    println!("schedule:");
    for entry in &output.schedule {
        let field = |key: &str| {
            entry
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string()
        };
        println!(
            "  {} {} UTC  {}",
            field("day"),
            field("time_utc"),
            field("platform")
        );
    }
    for entry in output.trace.entries() {
        println!(
            "  step {} {} ({} ms, {} retries)",
            entry.step, entry.agent_id, entry.elapsed_ms, entry.retries_used
        );
    }
}

fn print_failure(failure: &FailureRecord) {
    eprintln!("{failure}");
    let completed = failure.completed_steps();
    if !completed.is_empty() {
        let names: Vec<String> = completed.iter().map(|e| e.agent_id.to_string()).collect();
        eprintln!("completed steps: {}", names.join(", "));
    }
}

fn print_agents() -> anyhow::Result<()> {
    let registry = default_registry().context("failed to build agent registry")?;
    let order = registry.resolve_order().context("failed to resolve agent order")?;
    for (position, id) in order.iter().enumerate() {
        let entry = registry.get(id)?;
        let produces: Vec<&str> = entry.produces.iter().map(|f| f.as_str()).collect();
        println!("{}. {id} -> {}", position + 1, produces.join(", "));
    }
    Ok(())
}

async fn print_memory(config: &CliConfig) -> anyhow::Result<()> {
    let store = FileMemoryStore::new(&config.memory_path);
    let record = store
        .load()
        .await
        .with_context(|| format!("failed to load {}", config.memory_path.display()))?;
    if record.version() != MEMORY_RECORD_VERSION {
        tracing::warn!(
            found = record.version(),
            expected = MEMORY_RECORD_VERSION,
            "memory record version differs"
        );
    }
    println!("{}", record.to_document()?);
    Ok(())
}
