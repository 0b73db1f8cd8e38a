use std::time::Duration;

use thiserror::Error;

use crate::core::{ExecutionContext, TaskId};
use crate::orchestration::TaskFailure;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    // Graph validation. Fatal before any task runs.
    #[error("Duplicate task id: {0}")]
    DuplicateId(TaskId),

    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: TaskId, dependency: TaskId },

    #[error("Dependency cycle detected: {}", format_path(.path))]
    CycleDetected { path: Vec<TaskId> },

    #[error("Task {0} has a zero timeout")]
    InvalidTimeout(TaskId),

    // Planning.
    #[error("Failed to parse plan: {0}")]
    PlanParse(String),

    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    // Per-task failures, handled by the engine's failure policy.
    #[error("Unknown worker type: {0}")]
    UnknownWorkerType(String),

    #[error("Worker {worker_type} is unavailable: {reason}")]
    WorkerUnavailable { worker_type: String, reason: String },

    #[error("Task {task_id} ({worker_type}) failed: {cause}")]
    TaskExecution {
        task_id: TaskId,
        worker_type: String,
        cause: String,
    },

    #[error("Task {task_id} ({worker_type}) timed out after {timeout:?}")]
    TaskTimeout {
        task_id: TaskId,
        worker_type: String,
        timeout: Duration,
    },

    #[error("Task {task_id} was cancelled")]
    TaskCancelled { task_id: TaskId },

    #[error("Task {task_id} skipped because dependency {dependency} failed")]
    DependencyFailed { task_id: TaskId, dependency: TaskId },

    // Workflow-level, terminal.
    #[error("Deadlock: no runnable tasks remain, pending: {}{}", format_ids(.pending), format_prior_failures(.failures))]
    Deadlock {
        pending: Vec<TaskId>,
        /// Task failures recorded before the run stalled.
        failures: Vec<TaskFailure>,
        context: ExecutionContext,
    },

    #[error("{} task(s) failed: {}", .failures.len(), format_failures(.failures))]
    AggregateFailure {
        failures: Vec<TaskFailure>,
        context: ExecutionContext,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Invalid status transition for task {task_id} from {from} to {to}")]
    InvalidStatusTransition {
        task_id: TaskId,
        from: String,
        to: String,
    },

    #[error("Output for task {0} was already recorded")]
    ContextOverwrite(TaskId),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),
}

impl Error {
    /// Whether this error belongs to a single task rather than the whole workflow.
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownWorkerType(_)
                | Error::WorkerUnavailable { .. }
                | Error::TaskExecution { .. }
                | Error::TaskTimeout { .. }
                | Error::TaskCancelled { .. }
                | Error::DependencyFailed { .. }
        )
    }

    /// Partial context carried by workflow-level failures.
    pub fn partial_context(&self) -> Option<&ExecutionContext> {
        match self {
            Error::Deadlock { context, .. } | Error::AggregateFailure { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

fn format_path(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_prior_failures(failures: &[TaskFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!("; after failures: {}", format_failures(failures))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
