//! Wave-based execution engine.
//!
//! The engine repeatedly computes the ready frontier, runs every ready task
//! concurrently, and waits for the whole wave to settle before looking at
//! the next frontier. Outputs of successful tasks are recorded into the
//! execution context; failures are handled according to the configured
//! `FailurePolicy`.

use crate::core::{dag, ExecutionContext, Task, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::dispatcher::{TaskExecutor, DEFAULT_TASK_TIMEOUT_SECS};
use crate::orchestration::progress::{NoopNotifier, ProgressNotifier};
use crate::orchestration::registry::WorkerRegistry;
use crate::orchestration::report::{ExecutionReport, TaskFailure};
use crate::workflow::{EngineState, Workflow, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the engine does once a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel the rest of the failing wave and start no further waves.
    #[default]
    FailFast,
    /// Keep running everything that does not depend on a failed task.
    BestEffort,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail_fast"),
            FailurePolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.replace('-', "_").as_str() {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "best_effort" => Ok(FailurePolicy::BestEffort),
            other => Err(Error::Config(format!("unknown failure policy: {}", other))),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Timeout for tasks that do not set their own.
    pub task_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// Drives a workflow to completion over the worker registry.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use taskweave::orchestration::{EngineConfig, ExecutionEngine, LogNotifier};
///
/// let engine = ExecutionEngine::new(Arc::new(registry), EngineConfig::default())
///     .with_notifier(Arc::new(LogNotifier));
/// let report = engine.run(&workflow).await?;
/// let context = report.into_result()?;
/// ```
pub struct ExecutionEngine {
    registry: Arc<WorkerRegistry>,
    notifier: Arc<dyn ProgressNotifier>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<WorkerRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            notifier: Arc::new(NoopNotifier),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Validate and execute `workflow` under a fresh id.
    ///
    /// Returns `Err` only when the workflow fails validation, in which case
    /// no task has run. Task and workflow-level failures are reported in
    /// the returned `ExecutionReport`.
    pub async fn run(&self, workflow: &Workflow) -> Result<ExecutionReport> {
        self.run_with(WorkflowId::new(), workflow, Arc::clone(&self.notifier))
            .await
    }

    /// Like `run`, with an explicit id and a notifier for this run only.
    pub async fn run_with(
        &self,
        workflow_id: WorkflowId,
        workflow: &Workflow,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Result<ExecutionReport> {
        dag::validate(&workflow.tasks)?;
        info!(
            workflow_id = %workflow_id.short(),
            tasks = workflow.tasks.len(),
            policy = %self.config.failure_policy,
            "starting workflow: {}",
            workflow.objective
        );

        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&self.registry),
            notifier,
            self.config.task_timeout,
        ));
        let report = self.drive(workflow_id, workflow.tasks.clone(), executor).await;

        info!(
            workflow_id = %workflow_id.short(),
            state = %report.state,
            completed = report.context.len(),
            failed = report.errors.len(),
            waves = report.waves.len(),
            "workflow finished"
        );
        Ok(report)
    }

    /// The wave loop. Assumes nothing about `tasks` beyond unique ids.
    async fn drive(
        &self,
        workflow_id: WorkflowId,
        mut tasks: Vec<Task>,
        executor: Arc<TaskExecutor>,
    ) -> ExecutionReport {
        let index: HashMap<TaskId, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        let mut state = EngineState::Running;
        let mut completed: HashSet<TaskId> = HashSet::new();
        let mut failed: HashSet<TaskId> = HashSet::new();
        let mut context = ExecutionContext::new();
        let mut errors: Vec<TaskFailure> = Vec::new();
        let mut waves: Vec<Vec<TaskId>> = Vec::new();

        while completed.len() + failed.len() < tasks.len() {
            let ready: Vec<TaskId> = dag::ready_tasks(&completed, &tasks)
                .into_iter()
                .filter(|id| !failed.contains(id))
                .collect();

            if ready.is_empty() {
                let pending: Vec<&TaskId> = tasks
                    .iter()
                    .filter(|t| !completed.contains(&t.id) && !failed.contains(&t.id))
                    .map(|t| &t.id)
                    .collect();
                warn!(
                    workflow_id = %workflow_id.short(),
                    "deadlock: {} task(s) can never become ready: {:?}",
                    pending.len(),
                    pending
                );
                state = EngineState::Deadlocked;
                break;
            }

            debug!(wave = waves.len(), tasks = ?ready, "starting wave");
            for id in &ready {
                if let Err(e) = tasks[index[id]].start() {
                    warn!("{}", e);
                }
            }

            let cancel_on_failure = self.config.failure_policy == FailurePolicy::FailFast;
            let outcomes = run_wave(&executor, &ready, &tasks, &index, &context, cancel_on_failure)
                .await;
            waves.push(ready);

            let mut wave_failed = false;
            for (id, outcome) in outcomes {
                let task = &mut tasks[index[&id]];
                match outcome {
                    Ok(output) => {
                        if let Err(e) = context.record(id.clone(), output) {
                            warn!("{}", e);
                        }
                        if let Err(e) = task.complete() {
                            warn!("{}", e);
                        }
                        completed.insert(id);
                    }
                    Err(err) => {
                        if let Err(e) = task.fail(&err.to_string()) {
                            warn!("{}", e);
                        }
                        errors.push(TaskFailure::from_error(task, &err));
                        failed.insert(id);
                        wave_failed = true;
                    }
                }
            }

            if wave_failed {
                match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        info!(
                            workflow_id = %workflow_id.short(),
                            "fail-fast: stopping after wave {}",
                            waves.len() - 1
                        );
                        state = EngineState::Failed;
                        break;
                    }
                    FailurePolicy::BestEffort => {
                        prune_dependents(&mut tasks, &completed, &mut failed, &mut errors, &executor);
                    }
                }
            }
        }

        if state == EngineState::Running {
            state = if errors.is_empty() {
                EngineState::Completed
            } else {
                EngineState::Failed
            };
        }

        ExecutionReport {
            workflow_id,
            state,
            context,
            errors,
            waves,
            tasks,
        }
    }
}

/// Run one wave concurrently and wait for all of it to settle.
///
/// With `cancel_on_failure`, the first failure cancels the siblings that are
/// still running. Only tasks that finish successfully yield `Ok`.
async fn run_wave(
    executor: &Arc<TaskExecutor>,
    ready: &[TaskId],
    tasks: &[Task],
    index: &HashMap<TaskId, usize>,
    context: &ExecutionContext,
    cancel_on_failure: bool,
) -> Vec<(TaskId, Result<Value>)> {
    let snapshot = Arc::new(context.clone());
    let cancel = CancellationToken::new();
    let mut set = JoinSet::new();

    for id in ready {
        let task = tasks[index[id]].clone();
        let executor = Arc::clone(executor);
        let snapshot = Arc::clone(&snapshot);
        let cancel = cancel.clone();
        set.spawn(async move {
            let result = executor.execute_task(&task, &snapshot, &cancel).await;
            (task.id, result)
        });
    }

    let mut outcomes = Vec::with_capacity(ready.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((id, result)) => {
                if result.is_err() && cancel_on_failure && !cancel.is_cancelled() {
                    debug!(task_id = %id, "cancelling remaining tasks in wave");
                    cancel.cancel();
                }
                outcomes.push((id, result));
            }
            Err(e) => warn!("wave task did not settle: {}", e),
        }
    }

    // A spawned task that never reported back still has to settle.
    let settled: HashSet<TaskId> = outcomes.iter().map(|(id, _)| id.clone()).collect();
    for id in ready.iter().filter(|id| !settled.contains(*id)) {
        let task = &tasks[index[id]];
        let err = Error::TaskExecution {
            task_id: id.clone(),
            worker_type: task.worker_type.clone(),
            cause: "task aborted before settling".to_string(),
        };
        executor.notify_failed(task, &err);
        outcomes.push((id.clone(), Err(err)));
    }

    outcomes
}

/// Fail every unsettled task that depends, directly or transitively, on a
/// failed one. Each pruned task is reported once.
fn prune_dependents(
    tasks: &mut [Task],
    completed: &HashSet<TaskId>,
    failed: &mut HashSet<TaskId>,
    errors: &mut Vec<TaskFailure>,
    executor: &TaskExecutor,
) {
    loop {
        let mut changed = false;
        for task in tasks.iter_mut() {
            if completed.contains(&task.id) || failed.contains(&task.id) {
                continue;
            }
            let Some(dependency) = task.dependencies.iter().find(|d| failed.contains(*d)).cloned()
            else {
                continue;
            };

            let err = Error::DependencyFailed {
                task_id: task.id.clone(),
                dependency,
            };
            debug!(task_id = %task.id, "{}", err);
            if let Err(e) = task.fail(&err.to_string()) {
                warn!("{}", e);
            }
            executor.notify_failed(task, &err);
            errors.push(TaskFailure::from_error(task, &err));
            failed.insert(task.id.clone());
            changed = true;
        }
        if !changed {
            break;
        }
    }
}
