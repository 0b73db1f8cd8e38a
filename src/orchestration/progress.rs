//! Progress notifications for task settlements.
//!
//! The dispatcher reports every task as it starts and once more when it
//! settles. Settlements within a wave happen concurrently, so notifiers
//! must be `Send + Sync` and synchronize any shared state themselves.

use crate::core::TaskId;
use crate::orchestration::report::TaskFailure;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Status reported with a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Output or error attached to a step event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// No payload yet (the task just started).
    Pending,
    Output(Value),
    Error(TaskFailure),
}

/// One progress callback payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent {
    pub task_id: TaskId,
    pub worker_type: String,
    pub status: StepStatus,
    pub outcome: StepOutcome,
}

impl StepEvent {
    pub fn running(task_id: TaskId, worker_type: &str) -> Self {
        Self {
            task_id,
            worker_type: worker_type.to_string(),
            status: StepStatus::Running,
            outcome: StepOutcome::Pending,
        }
    }

    pub fn completed(task_id: TaskId, worker_type: &str, output: Value) -> Self {
        Self {
            task_id,
            worker_type: worker_type.to_string(),
            status: StepStatus::Completed,
            outcome: StepOutcome::Output(output),
        }
    }

    pub fn failed(failure: TaskFailure) -> Self {
        Self {
            task_id: failure.task_id.clone(),
            worker_type: failure.worker_type.clone(),
            status: StepStatus::Failed,
            outcome: StepOutcome::Error(failure),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != StepStatus::Running
    }
}

/// Callback sink invoked on every task transition.
pub trait ProgressNotifier: Send + Sync {
    fn on_step_complete(&self, event: &StepEvent);
}

impl<F> ProgressNotifier for F
where
    F: Fn(&StepEvent) + Send + Sync,
{
    fn on_step_complete(&self, event: &StepEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ProgressNotifier for NoopNotifier {
    fn on_step_complete(&self, _event: &StepEvent) {}
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl ProgressNotifier for LogNotifier {
    fn on_step_complete(&self, event: &StepEvent) {
        match &event.outcome {
            StepOutcome::Error(failure) => warn!(
                task_id = %event.task_id,
                worker_type = %event.worker_type,
                kind = ?failure.kind,
                "task failed: {}",
                failure.cause
            ),
            _ => info!(
                task_id = %event.task_id,
                worker_type = %event.worker_type,
                status = %event.status,
                "task progress"
            ),
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// Sending never blocks the caller; events are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<StepEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressNotifier for ChannelNotifier {
    fn on_step_complete(&self, event: &StepEvent) {
        let _ = self.tx.send(event.clone());
    }
}
