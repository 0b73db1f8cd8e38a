use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use taskweave::config::Config;
use taskweave::orchestration::{
    CommandReasoningService, ExecutionEngine, ExecutionReport, FailurePolicy, LogNotifier,
    WorkerRegistry, WorkflowPlanner,
};
use taskweave::workers::register_builtins;
use taskweave::workflow::Workflow;
use taskweave::Result;

/// Taskweave - dependency-driven task orchestration
#[derive(Parser, Debug)]
#[command(name = "taskweave")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    TASKWEAVE_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.taskweave/taskweave.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a workflow file and print its predicted waves
    Validate {
        /// Path to a workflow JSON file
        file: PathBuf,
    },

    /// Execute a workflow file with the built-in workers
    Run {
        /// Path to a workflow JSON file
        file: PathBuf,

        /// Failure policy: fail-fast or best-effort (overrides config)
        #[arg(long)]
        policy: Option<FailurePolicy>,

        /// Default per-task timeout in seconds (overrides config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Plan a workflow for an objective
    Plan {
        /// The objective in natural language
        objective: String,

        /// Extra guidance for the planner
        #[arg(long)]
        notes: Option<String>,

        /// Execute the plan after printing it
        #[arg(long)]
        execute: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = taskweave::log::init_with_debug(cli.debug) {
        info!("taskweave starting, log file {}", path.display());
    }

    let config = Config::load()?;
    match cli.command {
        Command::Validate { file } => run_validate(&file),
        Command::Run {
            file,
            policy,
            timeout,
        } => {
            let workflow = Workflow::load(&file)?;
            run_execute(&workflow, &config, policy, timeout)
        }
        Command::Plan {
            objective,
            notes,
            execute,
        } => run_plan(&objective, notes.as_deref(), execute, &config),
    }
}

fn run_validate(file: &Path) -> Result<()> {
    let workflow = Workflow::load(file)?;
    let graph = workflow.graph()?;

    println!("Workflow is valid: {} task(s)", graph.task_count());
    for (index, wave) in graph.levels().iter().enumerate() {
        let ids: Vec<&str> = wave.iter().map(|id| id.as_str()).collect();
        println!("  wave {}: {}", index, ids.join(", "));
    }
    Ok(())
}

fn run_execute(
    workflow: &Workflow,
    config: &Config,
    policy: Option<FailurePolicy>,
    timeout: Option<u64>,
) -> Result<()> {
    let mut engine_config = config.engine_config();
    if let Some(policy) = policy {
        engine_config.failure_policy = policy;
    }
    if let Some(secs) = timeout {
        engine_config.task_timeout = Duration::from_secs(secs);
    }

    let mut registry = WorkerRegistry::new();
    register_builtins(&mut registry);
    let build = registry.build(&config.worker_params());
    for failure in &build.failed {
        eprintln!(
            "warning: worker '{}' unavailable: {}",
            failure.worker_type, failure.reason
        );
    }

    let engine = ExecutionEngine::new(Arc::new(registry), engine_config)
        .with_notifier(Arc::new(LogNotifier));

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(engine.run(workflow))?;
    print_report(&report)
}

fn run_plan(objective: &str, notes: Option<&str>, execute: bool, config: &Config) -> Result<()> {
    let service = CommandReasoningService::new(config.planner.effective_command())?
        .with_timeout(config.planner.timeout());

    let mut registry = WorkerRegistry::new();
    register_builtins(&mut registry);
    let worker_types = registry.registered().map(str::to_string).collect();
    let planner = WorkflowPlanner::new(Arc::new(service), worker_types);

    let rt = tokio::runtime::Runtime::new()?;
    let workflow = rt.block_on(planner.generate(objective, notes))?;
    println!("{}", serde_json::to_string_pretty(&workflow)?);

    if execute {
        run_execute(&workflow, config, None, None)?;
    }
    Ok(())
}

fn print_report(report: &ExecutionReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if let Some(err) = report.error() {
        warn!("workflow {} did not complete: {}", report.workflow_id.short(), err);
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
    Ok(())
}
