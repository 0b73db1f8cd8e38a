//! Accumulated outputs of completed tasks.

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Mapping from completed task id to that task's output.
///
/// Each key is written once. The engine is the only writer and only records
/// an output after the task settled successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    outputs: BTreeMap<TaskId, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task's output. A second write for the same id is rejected.
    pub fn record(&mut self, id: TaskId, output: Value) -> Result<()> {
        if self.outputs.contains_key(&id) {
            return Err(Error::ContextOverwrite(id));
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&Value> {
        self.outputs.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.outputs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.outputs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &Value)> {
        self.outputs.iter()
    }

    /// The subset of outputs belonging to `ids`, i.e. a dependent's input context.
    ///
    /// Ids without a recorded output are skipped.
    pub fn restrict(&self, ids: &[TaskId]) -> ExecutionContext {
        let outputs = ids
            .iter()
            .filter_map(|id| self.outputs.get(id).map(|v| (id.clone(), v.clone())))
            .collect();
        ExecutionContext { outputs }
    }

    /// JSON object keyed by task id.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.outputs
                .iter()
                .map(|(id, v)| (id.to_string(), v.clone()))
                .collect(),
        )
    }
}
