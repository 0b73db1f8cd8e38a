//! Task dispatcher.
//!
//! Runs one task: resolves its worker, hands it the task input and the
//! outputs of its dependencies, bounds the call with a timeout, and turns
//! every way the call can go wrong into a typed per-task error. Nothing a
//! worker does (error, hang, panic) escapes as anything other than a failed
//! task.

use crate::core::{ExecutionContext, Task};
use crate::error::{Error, Result};
use crate::orchestration::progress::{ProgressNotifier, StepEvent};
use crate::orchestration::registry::WorkerRegistry;
use crate::orchestration::report::TaskFailure;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default per-task timeout (5 minutes).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

/// Executes single tasks against the worker registry.
pub struct TaskExecutor {
    registry: Arc<WorkerRegistry>,
    notifier: Arc<dyn ProgressNotifier>,
    default_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        notifier: Arc<dyn ProgressNotifier>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            notifier,
            default_timeout,
        }
    }

    /// Timeout that applies to `task`: its own override, else the default.
    pub fn timeout_for(&self, task: &Task) -> Duration {
        task.timeout().unwrap_or(self.default_timeout)
    }

    /// Structured input handed to the worker.
    pub fn task_input(task: &Task) -> Value {
        let mut input = json!({
            "task_id": task.id,
            "name": task.name,
            "description": task.description,
        });
        if let Some(expected) = &task.expected_output {
            input["expected_output"] = json!(expected);
        }
        if let Some(data) = &task.input_data {
            input["data"] = data.clone();
        }
        input
    }

    /// Execute `task` with the outputs accumulated so far.
    ///
    /// Only the outputs of `task.dependencies` reach the worker. The notifier
    /// sees `running` once the worker is resolved and exactly one terminal
    /// event when the task settles.
    pub async fn execute_task(
        &self,
        task: &Task,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let worker = match self.registry.resolve(&task.worker_type) {
            Ok(worker) => worker,
            Err(e) => {
                warn!(task_id = %task.id, worker_type = %task.worker_type, "cannot resolve worker: {}", e);
                self.notify_failed(task, &e);
                return Err(e);
            }
        };

        let input = Self::task_input(task);
        let dependency_context = context.restrict(&task.dependencies);
        let timeout = self.timeout_for(task);

        self.notifier
            .on_step_complete(&StepEvent::running(task.id.clone(), &task.worker_type));
        debug!(
            task_id = %task.id,
            worker_type = %task.worker_type,
            dependencies = dependency_context.len(),
            "dispatching task"
        );

        let call = AssertUnwindSafe(worker.execute(&input, &dependency_context)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::TaskCancelled { task_id: task.id.clone() }),
            settled = tokio::time::timeout(timeout, call) => match settled {
                Err(_) => Err(Error::TaskTimeout {
                    task_id: task.id.clone(),
                    worker_type: task.worker_type.clone(),
                    timeout,
                }),
                Ok(Err(panic)) => Err(Error::TaskExecution {
                    task_id: task.id.clone(),
                    worker_type: task.worker_type.clone(),
                    cause: format!("worker panicked: {}", panic_message(panic.as_ref())),
                }),
                Ok(Ok(Err(e))) => Err(Error::TaskExecution {
                    task_id: task.id.clone(),
                    worker_type: task.worker_type.clone(),
                    cause: e.to_string(),
                }),
                Ok(Ok(Ok(raw))) => Ok(normalize_output(raw)),
            },
        };

        match &outcome {
            Ok(output) => {
                debug!(task_id = %task.id, "task completed");
                self.notifier.on_step_complete(&StepEvent::completed(
                    task.id.clone(),
                    &task.worker_type,
                    output.clone(),
                ));
            }
            Err(e) => {
                warn!(task_id = %task.id, worker_type = %task.worker_type, "task failed: {}", e);
                self.notify_failed(task, e);
            }
        }
        outcome
    }

    /// Report a failure for a task that settles without (or outside of)
    /// `execute_task`.
    pub fn notify_failed(&self, task: &Task, error: &Error) {
        self.notifier
            .on_step_complete(&StepEvent::failed(TaskFailure::from_error(task, error)));
    }
}

/// Shape a worker's raw return value into structured output.
///
/// Objects pass through. A string holding a JSON object is parsed. Anything
/// else is wrapped as `{"result": <raw>}`.
pub fn normalize_output(raw: Value) -> Value {
    match raw {
        Value::Object(_) => raw,
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({ "result": s }),
        },
        other => json!({ "result": other }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
