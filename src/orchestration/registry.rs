//! Worker registry.
//!
//! A worker type is registered with a construction strategy: a factory plus a
//! declarative parameter binding listing the constructor parameters it takes,
//! which are required, and their defaults. `build` binds configured
//! parameters against that table for every strategy and reports which
//! workers came up and which did not, instead of failing the whole registry.

use crate::core::ExecutionContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// The executable capability bound to a task.
///
/// `input` is the task's own structured input; `context` holds the outputs
/// of the task's dependencies only.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> Result<Value>;
}

/// Constructor parameters after binding: supplied values with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerParams {
    values: Map<String, Value>,
}

impl WorkerParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.str(name)
            .ok_or_else(|| Error::Config(format!("parameter {} must be a string", name)))
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// A list of strings; non-string entries are rejected.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Config(format!("parameter {} must be a list of strings", name))
                    })
                })
                .collect(),
            Some(_) => Err(Error::Config(format!(
                "parameter {} must be a list of strings",
                name
            ))),
        }
    }
}

/// One constructor parameter in a binding table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            default: None,
        }
    }

    pub fn with_default(name: &str, default: Value) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            default: Some(default),
        }
    }
}

/// Declarative constructor parameters for one worker type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamBinding {
    pub params: Vec<ParamSpec>,
}

impl ParamBinding {
    /// A worker that takes no parameters.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Bind supplied values against the table.
    ///
    /// Defaults fill missing optional parameters; a missing required
    /// parameter or a parameter the table does not declare is an error.
    pub fn bind(&self, worker_type: &str, supplied: &Map<String, Value>) -> Result<WorkerParams> {
        if let Some(unknown) = supplied
            .keys()
            .find(|key| !self.params.iter().any(|p| &p.name == *key))
        {
            return Err(Error::Config(format!(
                "worker {} does not accept parameter {}",
                worker_type, unknown
            )));
        }

        let mut values = Map::new();
        for spec in &self.params {
            match supplied.get(&spec.name).or(spec.default.as_ref()) {
                Some(value) => {
                    values.insert(spec.name.clone(), value.clone());
                }
                None if spec.required => {
                    return Err(Error::Config(format!(
                        "worker {} is missing required parameter {}",
                        worker_type, spec.name
                    )));
                }
                None => {}
            }
        }
        Ok(WorkerParams { values })
    }
}

/// Builds a worker from bound parameters.
pub trait WorkerFactory: Send + Sync {
    fn build(&self, params: &WorkerParams) -> Result<Arc<dyn Worker>>;
}

impl<F> WorkerFactory for F
where
    F: Fn(&WorkerParams) -> Result<Arc<dyn Worker>> + Send + Sync,
{
    fn build(&self, params: &WorkerParams) -> Result<Arc<dyn Worker>> {
        self(params)
    }
}

/// How to construct one worker type.
#[derive(Clone)]
pub struct WorkerStrategy {
    pub factory: Arc<dyn WorkerFactory>,
    pub binding: ParamBinding,
}

impl std::fmt::Debug for WorkerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerStrategy")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

/// A worker type that failed to construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub worker_type: String,
    pub reason: String,
}

/// Outcome of `WorkerRegistry::build`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub built: Vec<String>,
    pub failed: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Maps worker types to construction strategies and built workers.
#[derive(Default)]
pub struct WorkerRegistry {
    strategies: BTreeMap<String, WorkerStrategy>,
    workers: HashMap<String, Arc<dyn Worker>>,
    unavailable: HashMap<String, String>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a construction strategy. Replaces any earlier registration
    /// for the same type and discards its built worker.
    pub fn register<F>(&mut self, worker_type: &str, factory: F, binding: ParamBinding)
    where
        F: WorkerFactory + 'static,
    {
        self.strategies.insert(
            worker_type.to_string(),
            WorkerStrategy {
                factory: Arc::new(factory),
                binding,
            },
        );
        self.workers.remove(worker_type);
        self.unavailable.remove(worker_type);
    }

    /// Register an already constructed, parameterless worker.
    pub fn register_worker(&mut self, worker_type: &str, worker: Arc<dyn Worker>) {
        let built = Arc::clone(&worker);
        self.register(
            worker_type,
            move |_: &WorkerParams| -> Result<Arc<dyn Worker>> { Ok(Arc::clone(&built)) },
            ParamBinding::none(),
        );
        self.workers.insert(worker_type.to_string(), worker);
    }

    /// Construct every registered worker type.
    ///
    /// `params` maps worker type to the raw parameters configured for it;
    /// types without an entry bind against an empty map. Construction
    /// failures are collected in the report and never abort the build.
    pub fn build(&mut self, params: &HashMap<String, Map<String, Value>>) -> BuildReport {
        let empty = Map::new();
        let mut report = BuildReport::default();

        for (worker_type, strategy) in &self.strategies {
            let supplied = params.get(worker_type).unwrap_or(&empty);
            let built = strategy
                .binding
                .bind(worker_type, supplied)
                .and_then(|bound| strategy.factory.build(&bound));

            match built {
                Ok(worker) => {
                    debug!(worker_type = %worker_type, "worker built");
                    self.workers.insert(worker_type.clone(), worker);
                    self.unavailable.remove(worker_type);
                    report.built.push(worker_type.clone());
                }
                Err(e) => {
                    warn!(worker_type = %worker_type, "worker construction failed: {}", e);
                    self.workers.remove(worker_type);
                    self.unavailable.insert(worker_type.clone(), e.to_string());
                    report.failed.push(BuildFailure {
                        worker_type: worker_type.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for worker_type in params.keys() {
            if !self.strategies.contains_key(worker_type) {
                warn!(worker_type = %worker_type, "parameters configured for unregistered worker");
            }
        }

        report
    }

    /// The construction strategy for `worker_type`.
    pub fn strategy(&self, worker_type: &str) -> Result<&WorkerStrategy> {
        self.strategies
            .get(worker_type)
            .ok_or_else(|| Error::UnknownWorkerType(worker_type.to_string()))
    }

    /// The built worker for `worker_type`.
    pub fn resolve(&self, worker_type: &str) -> Result<Arc<dyn Worker>> {
        if let Some(worker) = self.workers.get(worker_type) {
            return Ok(Arc::clone(worker));
        }
        self.strategy(worker_type)?;
        let reason = self
            .unavailable
            .get(worker_type)
            .cloned()
            .unwrap_or_else(|| "registry has not been built".to_string());
        Err(Error::WorkerUnavailable {
            worker_type: worker_type.to_string(),
            reason,
        })
    }

    /// Worker types that resolve successfully, sorted.
    pub fn available(&self) -> Vec<String> {
        self.strategies
            .keys()
            .filter(|t| self.workers.contains_key(*t))
            .cloned()
            .collect()
    }

    /// Every registered worker type, built or not, sorted.
    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn contains(&self, worker_type: &str) -> bool {
        self.strategies.contains_key(worker_type)
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("registered", &self.strategies.keys().collect::<Vec<_>>())
            .field("built", &self.workers.len())
            .finish()
    }
}
