//! Outcome of an engine run and the per-task failure records it carries.

use crate::core::{ExecutionContext, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::workflow::{EngineState, WorkflowId};
use serde::{Deserialize, Serialize};

/// Category of a per-task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownWorkerType,
    WorkerUnavailable,
    Execution,
    Timeout,
    Cancelled,
    DependencyFailed,
}

/// A task that settled as failed, with enough detail to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub worker_type: String,
    pub kind: FailureKind,
    pub cause: String,
}

impl TaskFailure {
    /// Classify a per-task error raised while running `task`.
    pub fn from_error(task: &Task, error: &Error) -> Self {
        let (kind, cause) = match error {
            Error::UnknownWorkerType(_) => (FailureKind::UnknownWorkerType, error.to_string()),
            Error::WorkerUnavailable { .. } => (FailureKind::WorkerUnavailable, error.to_string()),
            Error::TaskExecution { cause, .. } => (FailureKind::Execution, cause.clone()),
            Error::TaskTimeout { .. } => (FailureKind::Timeout, error.to_string()),
            Error::TaskCancelled { .. } => (FailureKind::Cancelled, error.to_string()),
            Error::DependencyFailed { .. } => (FailureKind::DependencyFailed, error.to_string()),
            other => (FailureKind::Execution, other.to_string()),
        };
        Self {
            task_id: task.id.clone(),
            worker_type: task.worker_type.clone(),
            kind,
            cause,
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.task_id, self.worker_type, self.cause)
    }
}

/// Everything a caller needs after a run: terminal state, accumulated
/// outputs, failures, and the wave each task ran in.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub workflow_id: WorkflowId,
    pub state: EngineState,
    pub context: ExecutionContext,
    pub errors: Vec<TaskFailure>,
    /// Task ids started in each wave, in wave order.
    pub waves: Vec<Vec<TaskId>>,
    /// Final state of every task.
    pub tasks: Vec<Task>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.state == EngineState::Completed
    }

    /// Index of the wave `id` ran in, if it ran at all.
    pub fn wave_of(&self, id: &TaskId) -> Option<usize> {
        self.waves.iter().position(|wave| wave.contains(id))
    }

    pub fn status_of(&self, id: &TaskId) -> Option<&TaskStatus> {
        self.tasks.iter().find(|t| &t.id == id).map(|t| &t.status)
    }

    pub fn failure_for(&self, id: &TaskId) -> Option<&TaskFailure> {
        self.errors.iter().find(|f| &f.task_id == id)
    }

    /// Tasks that never settled.
    pub fn pending(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| t.id.clone())
            .collect()
    }

    /// The workflow-level error for a run that did not complete.
    pub fn error(&self) -> Option<Error> {
        match self.state {
            EngineState::Deadlocked => Some(Error::Deadlock {
                pending: self.pending(),
                failures: self.errors.clone(),
                context: self.context.clone(),
            }),
            EngineState::Failed => Some(Error::AggregateFailure {
                failures: self.errors.clone(),
                context: self.context.clone(),
            }),
            _ => None,
        }
    }

    /// The final context, or the workflow-level error carrying the partial one.
    pub fn into_result(self) -> Result<ExecutionContext> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self.context),
        }
    }
}
