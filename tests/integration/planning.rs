//! Objective-to-result flow through the planner and the workflow service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

use taskweave::orchestration::{
    ChannelNotifier, EngineConfig, ExecutionEngine, ReasoningService, StepEvent, StepStatus,
    WorkerRegistry, WorkflowPlanner, WorkflowService,
};
use taskweave::workers::register_builtins;
use taskweave::{EngineState, Error, Result};

use crate::fixtures::id;

/// Reasoning service that replays canned replies in order.
struct Replay {
    replies: Mutex<Vec<String>>,
}

impl Replay {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl ReasoningService for Replay {
    async fn request(&self, _prompt: &str) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::Reasoning("no more replies".to_string()))
    }
}

const REPORT_PLAN: &str = r#"I broke the objective down as follows.

```json
{
  "workflow_name": "quarterly_report",
  "workflow_description": "Gather numbers and write them up",
  "tasks": [
    {"id": "gather", "name": "Gather", "agent_type": "echo", "description": "collect figures", "dependencies": []},
    {"id": "chart", "name": "Chart", "agent_type": "echo", "description": "plot figures", "dependencies": ["gather"]},
    {"id": "write", "name": "Write", "agent_type": "echo", "description": "write report", "dependencies": ["gather", "chart"], "expected_output": "markdown"}
  ],
  "success_metrics": ["report delivered"]
}
```"#;

fn service(replies: &[&str]) -> (WorkflowService, UnboundedReceiver<StepEvent>) {
    let mut registry = WorkerRegistry::new();
    register_builtins(&mut registry);
    let build = registry.build(&Default::default());
    assert_eq!(build.built, vec!["echo".to_string()]);

    let worker_types = registry.available();
    let planner = WorkflowPlanner::new(Replay::new(replies), worker_types);
    let engine = ExecutionEngine::new(
        Arc::new(registry),
        EngineConfig {
            task_timeout: Duration::from_secs(10),
            ..EngineConfig::default()
        },
    );
    let (notifier, rx) = ChannelNotifier::new();
    let service = WorkflowService::new(Arc::new(engine))
        .with_planner(Arc::new(planner))
        .with_notifier(Arc::new(notifier));
    (service, rx)
}

/// Given a planner reply wrapped in prose and a code fence
/// When the objective is submitted
/// Then the plan runs on the echo worker and every output is recorded
#[tokio::test]
async fn test_objective_runs_to_completion() {
    let (service, mut rx) = service(&[REPORT_PLAN]);
    let workflow_id = service
        .submit("Write the quarterly report", Some("use last quarter's data"))
        .await
        .unwrap();

    let report = service.wait(&workflow_id).await.unwrap();
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.waves.len(), 3);

    let write = report.context.get(&id("write")).unwrap();
    assert_eq!(write["input"]["expected_output"], "markdown");
    let seen = write["context"].as_object().unwrap();
    assert!(seen.contains_key("gather"));
    assert!(seen.contains_key("chart"));

    let status = service.get_status(&workflow_id).unwrap();
    assert_eq!(status.state, EngineState::Completed);
    assert_eq!(status.context.len(), 3);

    let mut completed = 0;
    while let Ok(event) = rx.try_recv() {
        if event.status == StepStatus::Completed {
            completed += 1;
        }
    }
    assert_eq!(completed, 3);
}

/// An unparseable plan is rejected before anything runs
#[tokio::test]
async fn test_unparseable_plan_is_rejected() {
    let (service, _rx) = service(&["I could not come up with a plan, sorry."]);
    let err = assert_err!(service.submit("Anything", None).await);
    assert!(matches!(err, Error::PlanParse(_)));
    assert!(service.workflows().is_empty());
}

/// A cyclic plan is rejected before anything runs
#[tokio::test]
async fn test_cyclic_plan_is_rejected() {
    let cyclic = r#"{"tasks": [
        {"id": "a", "agent_type": "echo", "dependencies": ["b"]},
        {"id": "b", "agent_type": "echo", "dependencies": ["a"]}
    ]}"#;
    let (service, _rx) = service(&[cyclic]);
    assert!(matches!(
        service.submit("Loop forever", None).await,
        Err(Error::PlanParse(_))
    ));
}

/// A plan naming an unregistered worker is accepted but that task fails at run time
#[tokio::test]
async fn test_plan_with_unknown_worker_fails_that_task() {
    let plan = r#"{"tasks": [
        {"id": "a", "agent_type": "echo"},
        {"id": "b", "agent_type": "Nonexistent", "dependencies": ["a"]}
    ]}"#;
    let (service, _rx) = service(&[plan]);
    let workflow_id = assert_ok!(service.submit("Mixed", None).await);
    let report = assert_ok!(service.wait(&workflow_id).await);

    assert_eq!(report.state, EngineState::Failed);
    assert!(report.context.contains(&id("a")));
    let status = service.get_status(&workflow_id).unwrap();
    assert_eq!(status.errors.len(), 1);
    assert_eq!(status.errors[0].task_id, id("b"));
}
