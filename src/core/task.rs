//! Task data model for the workflow graph.
//!
//! Tasks are the atomic units of work bound to a worker type. Each task
//! tracks its dependencies, optional input, execution hints and status.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of a task within one workflow.
///
/// Ids are chosen by whoever authors the workflow (usually the planner),
/// so they are plain strings rather than generated UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status in its lifecycle.
///
/// Transitions only move forward: pending -> running -> completed | failed.
/// A pending task may also fail directly when it is never started because
/// an upstream task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task created but not yet started.
    #[default]
    Pending,
    /// Task is currently executing on its worker.
    Running,
    /// Task completed successfully and its output is in the context.
    Completed,
    /// Task failed with an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl TaskStatus {
    fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed { .. } => "failed",
        }
    }

    /// Check if the status is terminal (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// A single task in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub name: String,
    /// Worker type that executes this task. Planner payloads call it `agent_type`.
    #[serde(alias = "agent_type")]
    pub worker_type: String,
    /// What the task should accomplish.
    #[serde(default)]
    pub description: String,
    /// Ids of tasks whose output this task consumes.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Static input handed to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,
    /// Hint describing the expected output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Free-form duration estimate from the planner (e.g. "5 minutes").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    /// Per-task timeout override in milliseconds. Must be positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Current execution status. Owned by the engine; never read from input.
    #[serde(default, skip_deserializing)]
    pub status: TaskStatus,
    /// When the task started execution.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task settled (success or failure).
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with the given id and worker type.
    ///
    /// The name defaults to the id; everything optional is unset.
    pub fn new(id: impl Into<TaskId>, worker_type: &str) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            worker_type: worker_type.to_string(),
            description: String::new(),
            dependencies: Vec::new(),
            input_data: None,
            expected_output: None,
            estimated_duration: None,
            timeout_ms: None,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input_data = Some(input);
        self
    }

    /// Override the engine's default timeout for this task.
    ///
    /// Sub-millisecond remainders round up, so only a zero duration is
    /// stored as zero (and rejected by validation).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let mut millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if timeout.subsec_nanos() % 1_000_000 != 0 {
            millis = millis.saturating_add(1);
        }
        self.timeout_ms = Some(millis);
        self
    }

    /// Per-task timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Transition Pending -> Running and record the start time.
    pub fn start(&mut self) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.invalid_transition("running"));
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition Running -> Completed and record the completion time.
    pub fn complete(&mut self) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Err(self.invalid_transition("completed"));
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task failed. Allowed from Pending or Running.
    pub fn fail(&mut self, error: &str) -> Result<()> {
        if self.status.is_finished() {
            return Err(self.invalid_transition("failed"));
        }
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    fn invalid_transition(&self, to: &str) -> Error {
        Error::InvalidStatusTransition {
            task_id: self.id.clone(),
            from: self.status.label().to_string(),
            to: to.to_string(),
        }
    }
}
