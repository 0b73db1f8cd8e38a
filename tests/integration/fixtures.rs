//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted workers with controllable delay, output and failure
//! - A notifier that records every progress event
//! - Predefined task sets

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use taskweave::orchestration::{
    EngineConfig, ExecutionEngine, FailurePolicy, StepEvent, StepStatus, Worker, WorkerRegistry,
};
use taskweave::{Error, ExecutionContext, Result, Task, TaskId};

/// What a scripted worker does for one task id.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this output after the delay.
    Output(Value),
    /// Fail with this cause after the delay.
    Fail(String),
    /// Never return.
    Hang,
}

/// Shared observations from every scripted worker call.
#[derive(Debug, Default)]
pub struct Journal {
    /// Dependency context keys each task saw, by task id.
    pub contexts: Mutex<HashMap<String, Vec<String>>>,
    /// Task ids in the order they started.
    pub started: Mutex<Vec<String>>,
    running: AtomicUsize,
    /// Highest number of calls in flight at once.
    pub max_concurrent: AtomicUsize,
}

impl Journal {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn context_of(&self, id: &str) -> Option<Vec<String>> {
        self.contexts.lock().unwrap().get(id).cloned()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

/// A worker whose behavior is scripted per task id.
///
/// Task ids without a script return `{"task": id}` immediately.
pub struct ScriptedWorker {
    scripts: HashMap<String, (Duration, Script)>,
    journal: Arc<Journal>,
}

impl ScriptedWorker {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            scripts: HashMap::new(),
            journal,
        }
    }

    pub fn script(mut self, id: &str, delay: Duration, script: Script) -> Self {
        self.scripts.insert(id.to_string(), (delay, script));
        self
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<Value> {
        let id = input["task_id"].as_str().unwrap_or_default().to_string();
        self.journal.started.lock().unwrap().push(id.clone());
        self.journal.contexts.lock().unwrap().insert(
            id.clone(),
            context.ids().map(|t| t.to_string()).collect(),
        );
        let now = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let (delay, script) = self
            .scripts
            .get(&id)
            .cloned()
            .unwrap_or((Duration::ZERO, Script::Output(json!({"task": id}))));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = match script {
            Script::Output(value) => Ok(value),
            Script::Fail(cause) => Err(Error::Config(cause)),
            Script::Hang => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
        };
        self.journal.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Records every progress event.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<StepEvent>>>,
}

impl Recorder {
    pub fn notifier(&self) -> impl Fn(&StepEvent) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &StepEvent| events.lock().unwrap().push(event.clone())
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Terminal events for `id`.
    pub fn terminal_for(&self, id: &str) -> Vec<StepEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id.as_str() == id && e.status != StepStatus::Running)
            .collect()
    }
}

/// Engine over a registry holding `worker` as "scripted" and a plain "fast" worker.
pub fn engine_with(worker: ScriptedWorker, policy: FailurePolicy, timeout: Duration) -> ExecutionEngine {
    let journal = Arc::clone(&worker.journal);
    let mut registry = WorkerRegistry::new();
    registry.register_worker("scripted", Arc::new(worker));
    registry.register_worker("fast", Arc::new(ScriptedWorker::new(journal)));
    ExecutionEngine::new(
        Arc::new(registry),
        EngineConfig {
            task_timeout: timeout,
            failure_policy: policy,
        },
    )
}

/// A task on the "scripted" worker.
pub fn scripted(id: &str, deps: &[&str]) -> Task {
    Task::new(id, "scripted").with_dependencies(deps.iter().copied())
}

/// A chain a -> b -> c -> ... of `n` tasks.
pub fn chain(n: usize) -> Vec<Task> {
    (0..n)
        .map(|i| {
            let task = scripted(&format!("t{}", i), &[]);
            if i == 0 {
                task
            } else {
                task.with_dependencies([format!("t{}", i - 1)])
            }
        })
        .collect()
}

/// `n` tasks with no dependencies.
pub fn independent(n: usize) -> Vec<Task> {
    (0..n).map(|i| scripted(&format!("t{}", i), &[])).collect()
}

pub fn id(s: &str) -> TaskId {
    TaskId::from(s)
}
