//! Objective-to-workflow planning.
//!
//! The planner asks a reasoning service to decompose an objective into a
//! task graph, parses the JSON plan out of the reply, and validates it.
//! Replies are untrusted: anything that does not parse into a non-empty,
//! valid graph is rejected with `Error::PlanParse`.

use crate::core::{dag, Task, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::reasoning::ReasoningService;
use crate::workflow::Workflow;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// A fenced code block, optionally tagged `json`.
static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)```").unwrap());

/// The plan payload returned by the reasoning service.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub workflow_description: Option<String>,
    pub tasks: Vec<PlannedTask>,
    #[serde(default)]
    pub quality_criteria: Vec<String>,
    #[serde(default)]
    pub success_metrics: Vec<String>,
}

/// One task as the reasoning service describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannedTask {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "worker_type")]
    pub agent_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    /// Accepts `"5 minutes"` as well as bare numbers.
    #[serde(default)]
    pub estimated_duration: Option<Value>,
}

impl PlannedTask {
    fn into_task(self) -> Task {
        let estimated_duration = self.estimated_duration.and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        });
        Task {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            description: self.description,
            dependencies: self.dependencies.into_iter().map(TaskId::from).collect(),
            expected_output: self.expected_output,
            estimated_duration,
            ..Task::new(self.id, &self.agent_type)
        }
    }
}

/// Turns objectives into validated workflows.
pub struct WorkflowPlanner {
    service: Arc<dyn ReasoningService>,
    worker_types: Vec<String>,
}

impl WorkflowPlanner {
    /// `worker_types` are offered to the service as the valid `agent_type`s.
    pub fn new(service: Arc<dyn ReasoningService>, worker_types: Vec<String>) -> Self {
        Self {
            service,
            worker_types,
        }
    }

    pub fn worker_types(&self) -> &[String] {
        &self.worker_types
    }

    /// Plan `objective` into a validated workflow. Nothing is executed.
    pub async fn generate(&self, objective: &str, notes: Option<&str>) -> Result<Workflow> {
        let prompt = self.build_prompt(objective, notes);
        debug!(objective, prompt_len = prompt.len(), "requesting plan");

        let reply = self.service.request(&prompt).await?;
        let plan = parse_plan(&reply)?;
        let workflow = self.build_workflow(objective, notes, plan);

        dag::validate(&workflow.tasks)
            .map_err(|e| Error::PlanParse(format!("plan is not a valid task graph: {}", e)))?;

        for task in &workflow.tasks {
            if !self.worker_types.is_empty() && !self.worker_types.contains(&task.worker_type) {
                warn!(task_id = %task.id, worker_type = %task.worker_type, "plan uses an unregistered worker type");
            }
        }
        info!(
            tasks = workflow.tasks.len(),
            name = workflow.name.as_deref().unwrap_or(""),
            "plan generated"
        );
        Ok(workflow)
    }

    fn build_workflow(&self, objective: &str, notes: Option<&str>, plan: PlanResponse) -> Workflow {
        let tasks = plan.tasks.into_iter().map(PlannedTask::into_task).collect();
        Workflow {
            notes: notes.map(str::to_string),
            name: plan.workflow_name,
            description: plan.workflow_description,
            quality_criteria: plan.quality_criteria,
            success_metrics: plan.success_metrics,
            ..Workflow::new(objective, tasks)
        }
    }

    pub fn build_prompt(&self, objective: &str, notes: Option<&str>) -> String {
        let workers = if self.worker_types.is_empty() {
            "(none registered)".to_string()
        } else {
            self.worker_types.join(", ")
        };
        let notes = notes
            .filter(|n| !n.trim().is_empty())
            .map(|n| format!("\nAdditional notes:\n{}\n", n))
            .unwrap_or_default();

        format!(
            r#"Break the following objective into a workflow of tasks.

Objective:
{objective}
{notes}
Available worker types: {workers}

Each task must use one of the available worker types as its agent_type.
Dependencies list the ids of tasks whose output the task needs. The
dependency graph must not contain cycles.

Respond with only a JSON object of this shape:
{{
  "workflow_name": "short name",
  "workflow_description": "what the workflow achieves",
  "tasks": [
    {{
      "id": "task_1",
      "name": "human readable name",
      "agent_type": "one of the available worker types",
      "description": "what this task does",
      "dependencies": [],
      "expected_output": "what the task produces",
      "estimated_duration": "5 minutes"
    }}
  ],
  "quality_criteria": ["..."],
  "success_metrics": ["..."]
}}"#
        )
    }
}

/// Locate the JSON object in a reply: the first fenced block that holds
/// one, otherwise the span from the first `{` to the last `}`.
pub fn extract_json(reply: &str) -> Option<&str> {
    for caps in FENCED_BLOCK_RE.captures_iter(reply) {
        if let Some(body) = caps.get(1) {
            let body = body.as_str().trim();
            if body.starts_with('{') {
                return Some(body);
            }
        }
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

/// Parse a reply into a plan with at least one task.
pub fn parse_plan(reply: &str) -> Result<PlanResponse> {
    let json = extract_json(reply)
        .ok_or_else(|| Error::PlanParse("no JSON object in reasoning reply".to_string()))?;
    let plan: PlanResponse = serde_json::from_str(json)
        .map_err(|e| Error::PlanParse(format!("malformed plan: {}", e)))?;
    if plan.tasks.is_empty() {
        return Err(Error::PlanParse("plan contains no tasks".to_string()));
    }
    Ok(plan)
}
