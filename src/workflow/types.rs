//! Core workflow type definitions.

use crate::core::{dag, Task, WorkflowGraph};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Unique identifier for a submitted workflow run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new unique workflow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of one engine run.
///
/// `Init -> Running -> {Completed | Failed | Deadlocked}`; the last three
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Run created but not yet started
    #[default]
    Init,
    /// Waves are executing
    Running,
    /// Every task completed
    Completed,
    /// At least one task failed
    Failed,
    /// Unsettled tasks remain but none can become ready
    Deadlocked,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Completed | EngineState::Failed | EngineState::Deadlocked
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Init => write!(f, "init"),
            EngineState::Running => write!(f, "running"),
            EngineState::Completed => write!(f, "completed"),
            EngineState::Failed => write!(f, "failed"),
            EngineState::Deadlocked => write!(f, "deadlocked"),
        }
    }
}

/// A task graph generated for one high-level objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The objective this workflow serves.
    pub objective: String,
    /// Extra guidance supplied alongside the objective.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Short name assigned by the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Longer description assigned by the planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tasks in authoring order.
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_metrics: Vec<String>,
}

impl Workflow {
    pub fn new(objective: &str, tasks: Vec<Task>) -> Self {
        Self {
            objective: objective.to_string(),
            notes: None,
            name: None,
            description: None,
            tasks,
            quality_criteria: Vec::new(),
            success_metrics: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    /// Validate the task graph without building it.
    pub fn validate(&self) -> Result<()> {
        dag::validate(&self.tasks)
    }

    /// Validate and build the task graph.
    pub fn graph(&self) -> Result<WorkflowGraph> {
        WorkflowGraph::new(self.tasks.clone())
    }

    /// Load a workflow from a JSON file. The result is not yet validated.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
