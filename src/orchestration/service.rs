//! Submission front end over the engine.
//!
//! `WorkflowService` plans and validates synchronously, then runs the
//! workflow on a background tokio task. Callers poll `get_status` for live
//! snapshots or `wait` for the final report. A run stays tracked until
//! `take` or `forget` releases it.

use crate::core::ExecutionContext;
use crate::error::{Error, Result};
use crate::orchestration::engine::ExecutionEngine;
use crate::orchestration::planner::WorkflowPlanner;
use crate::orchestration::progress::{NoopNotifier, ProgressNotifier, StepEvent, StepOutcome};
use crate::orchestration::report::{ExecutionReport, TaskFailure};
use crate::workflow::{EngineState, Workflow, WorkflowId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Point-in-time view of a submitted workflow.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub workflow_id: WorkflowId,
    pub state: EngineState,
    /// Outputs recorded so far.
    pub context: ExecutionContext,
    /// Failures recorded so far.
    pub errors: Vec<TaskFailure>,
}

struct Run {
    snapshot: Arc<Mutex<StatusSnapshot>>,
    done: watch::Receiver<Option<ExecutionReport>>,
}

/// Keeps a run's snapshot current and forwards events to the caller's notifier.
struct Tracker {
    snapshot: Arc<Mutex<StatusSnapshot>>,
    inner: Arc<dyn ProgressNotifier>,
}

impl ProgressNotifier for Tracker {
    fn on_step_complete(&self, event: &StepEvent) {
        {
            let mut snapshot = lock(&self.snapshot);
            match &event.outcome {
                StepOutcome::Output(output) => {
                    if let Err(e) = snapshot.context.record(event.task_id.clone(), output.clone()) {
                        debug!("{}", e);
                    }
                }
                StepOutcome::Error(failure) => snapshot.errors.push(failure.clone()),
                StepOutcome::Pending => {}
            }
        }
        self.inner.on_step_complete(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accepts objectives or ready-made workflows and tracks their runs.
pub struct WorkflowService {
    engine: Arc<ExecutionEngine>,
    planner: Option<Arc<WorkflowPlanner>>,
    notifier: Arc<dyn ProgressNotifier>,
    runs: RwLock<HashMap<WorkflowId, Run>>,
}

impl WorkflowService {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            planner: None,
            notifier: Arc::new(NoopNotifier),
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_planner(mut self, planner: Arc<WorkflowPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Notifier that receives every run's events.
    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Plan `objective` and start executing it.
    ///
    /// Planning and validation errors are returned here and nothing runs.
    pub async fn submit(&self, objective: &str, notes: Option<&str>) -> Result<WorkflowId> {
        let planner = self
            .planner
            .as_ref()
            .ok_or_else(|| Error::Config("no planner configured".to_string()))?;
        let workflow = planner.generate(objective, notes).await?;
        self.submit_workflow(workflow)
    }

    /// Validate `workflow` and start executing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit_workflow(&self, workflow: Workflow) -> Result<WorkflowId> {
        workflow.validate()?;

        let id = WorkflowId::new();
        let snapshot = Arc::new(Mutex::new(StatusSnapshot {
            workflow_id: id,
            state: EngineState::Running,
            context: ExecutionContext::new(),
            errors: Vec::new(),
        }));
        let (tx, rx) = watch::channel(None);

        self.runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                id,
                Run {
                    snapshot: Arc::clone(&snapshot),
                    done: rx,
                },
            );

        let engine = Arc::clone(&self.engine);
        let tracker: Arc<dyn ProgressNotifier> = Arc::new(Tracker {
            snapshot: Arc::clone(&snapshot),
            inner: Arc::clone(&self.notifier),
        });
        info!(workflow_id = %id.short(), tasks = workflow.tasks.len(), "workflow submitted");

        tokio::spawn(async move {
            let report = match engine.run_with(id, &workflow, tracker).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(workflow_id = %id.short(), "workflow rejected at start: {}", e);
                    ExecutionReport {
                        workflow_id: id,
                        state: EngineState::Failed,
                        context: ExecutionContext::new(),
                        errors: Vec::new(),
                        waves: Vec::new(),
                        tasks: workflow.tasks,
                    }
                }
            };
            {
                let mut snap = lock(&snapshot);
                snap.state = report.state;
                snap.context = report.context.clone();
                snap.errors = report.errors.clone();
            }
            let _ = tx.send(Some(report));
        });

        Ok(id)
    }

    /// Current snapshot of a submitted workflow.
    pub fn get_status(&self, id: &WorkflowId) -> Result<StatusSnapshot> {
        let runs = self.runs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let run = runs
            .get(id)
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?;
        let snapshot = lock(&run.snapshot).clone();
        Ok(snapshot)
    }

    /// Wait for a submitted workflow to finish and return its report.
    pub async fn wait(&self, id: &WorkflowId) -> Result<ExecutionReport> {
        let mut done = {
            let runs = self.runs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            runs.get(id)
                .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?
                .done
                .clone()
        };
        let report = done
            .wait_for(|report| report.is_some())
            .await
            .map_err(|_| Error::WorkflowNotFound(id.to_string()))?;
        report
            .clone()
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))
    }

    /// Wait for a workflow to finish, then stop tracking it.
    pub async fn take(&self, id: &WorkflowId) -> Result<ExecutionReport> {
        let report = self.wait(id).await?;
        self.forget(id);
        Ok(report)
    }

    /// Stop tracking a workflow. A run still in progress keeps executing,
    /// but its status and report are no longer reachable here.
    pub fn forget(&self, id: &WorkflowId) -> bool {
        let removed = self
            .runs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .is_some();
        if removed {
            debug!(workflow_id = %id.short(), "workflow released");
        }
        removed
    }

    /// Ids of every workflow this service is tracking.
    pub fn workflows(&self) -> Vec<WorkflowId> {
        self.runs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect()
    }
}
