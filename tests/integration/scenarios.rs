//! End-to-end engine scenarios: fan-in, cycles, partial failure, unknown
//! workers and timeouts.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use taskweave::orchestration::{FailureKind, FailurePolicy, StepOutcome, StepStatus};
use taskweave::{EngineState, Error, Task, Workflow, WorkflowId};

use crate::fixtures::{engine_with, id, scripted, Journal, Recorder, Script, ScriptedWorker};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Scenario: fan-in
/// Given T1 and T2 with no dependencies and T3 depending on both
/// When the engine runs
/// Then T1 and T2 share wave 0, T3 runs in wave 1 seeing both outputs
#[tokio::test]
async fn test_fan_in() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("T1", Duration::from_millis(20), Script::Output(json!({"out": 1})))
        .script("T2", Duration::from_millis(20), Script::Output(json!({"out": 2})))
        .script("T3", Duration::ZERO, Script::Output(json!({"out": 3})));
    let engine = engine_with(worker, FailurePolicy::FailFast, TIMEOUT);

    let wf = Workflow::new(
        "fan-in",
        vec![scripted("T1", &[]), scripted("T2", &[]), scripted("T3", &["T1", "T2"])],
    );
    let report = engine.run(&wf).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.wave_of(&id("T1")), Some(0));
    assert_eq!(report.wave_of(&id("T2")), Some(0));
    assert_eq!(report.wave_of(&id("T3")), Some(1));
    assert_eq!(journal.max_concurrent(), 2);
    assert_eq!(
        journal.context_of("T3"),
        Some(vec!["T1".to_string(), "T2".to_string()])
    );

    let context = report.into_result().unwrap();
    assert_eq!(context.len(), 3);
    assert_eq!(context.get(&id("T1")), Some(&json!({"out": 1})));
    assert_eq!(context.get(&id("T3")), Some(&json!({"out": 3})));
}

/// Scenario: cycle
/// Given T1 -> T2 -> T1
/// Then validation fails with the cycle path and no worker is called
#[tokio::test]
async fn test_cycle_never_starts() {
    let journal = Arc::new(Journal::default());
    let engine = engine_with(
        ScriptedWorker::new(Arc::clone(&journal)),
        FailurePolicy::FailFast,
        TIMEOUT,
    );
    let wf = Workflow::new("cycle", vec![scripted("T1", &["T2"]), scripted("T2", &["T1"])]);

    match engine.run(&wf).await {
        Err(Error::CycleDetected { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&id("T1")));
            assert!(path.contains(&id("T2")));
        }
        other => panic!("expected CycleDetected, got {:?}", other),
    }
    assert!(journal.started().is_empty());
    assert!(matches!(wf.validate(), Err(Error::CycleDetected { .. })));
}

/// Scenario: fail-fast partial failure
/// Given T1 (fails) and T2 (succeeds) in one wave and T3 depending on T1
/// Then the run fails naming T1, keeps T2's output and never starts T3
#[tokio::test(start_paused = true)]
async fn test_fail_fast_partial_failure() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("T1", Duration::from_millis(50), Script::Fail("disk full".to_string()))
        .script("T2", Duration::ZERO, Script::Output(json!("two")));
    let engine = engine_with(worker, FailurePolicy::FailFast, TIMEOUT);
    let wf = Workflow::new(
        "partial",
        vec![scripted("T1", &[]), scripted("T2", &[]), scripted("T3", &["T1"])],
    );

    let report = engine.run(&wf).await.unwrap();
    assert_eq!(report.state, EngineState::Failed);
    assert_eq!(report.waves.len(), 1);
    assert!(!journal.started().contains(&"T3".to_string()));

    match report.into_result() {
        Err(Error::AggregateFailure { failures, context }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].task_id, id("T1"));
            assert_eq!(failures[0].cause, "Configuration error: disk full");
            assert!(context.contains(&id("T2")));
            assert!(!context.contains(&id("T3")));
        }
        other => panic!("expected AggregateFailure, got {:?}", other),
    }
}

/// Scenario: unknown worker
/// Given a completed first wave and a second-wave task on "Nonexistent"
/// Then that task fails with UnknownWorkerType and earlier outputs survive
#[tokio::test]
async fn test_unknown_worker_keeps_prior_outputs() {
    let journal = Arc::new(Journal::default());
    let engine = engine_with(
        ScriptedWorker::new(Arc::clone(&journal)),
        FailurePolicy::FailFast,
        TIMEOUT,
    );
    let recorder = Recorder::default();
    let wf = Workflow::new(
        "unknown",
        vec![
            scripted("T1", &[]),
            Task::new("T2", "Nonexistent").with_dependencies(["T1"]),
        ],
    );

    let report = engine
        .run_with(WorkflowId::new(), &wf, Arc::new(recorder.notifier()))
        .await
        .unwrap();

    assert_eq!(report.state, EngineState::Failed);
    let failure = report.failure_for(&id("T2")).unwrap();
    assert_eq!(failure.kind, FailureKind::UnknownWorkerType);
    assert_eq!(failure.worker_type, "Nonexistent");
    assert!(report.context.contains(&id("T1")));

    let terminal = recorder.terminal_for("T2");
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, StepStatus::Failed);
}

/// Scenario: timeout
/// Given a hanging task with a 1s timeout and a fast sibling
/// Then only the hanging task times out and the sibling keeps its output
#[tokio::test(start_paused = true)]
async fn test_timeout_only_affects_hanging_task() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("slow", Duration::ZERO, Script::Hang)
        .script("quick", Duration::from_millis(10), Script::Output(json!("done")));
    let engine = engine_with(worker, FailurePolicy::FailFast, TIMEOUT);
    let wf = Workflow::new(
        "timeout",
        vec![
            scripted("slow", &[]).with_timeout(Duration::from_secs(1)),
            scripted("quick", &[]),
        ],
    );

    let report = engine.run(&wf).await.unwrap();
    assert_eq!(report.errors.len(), 1);
    let failure = report.failure_for(&id("slow")).unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(report.context.get(&id("quick")), Some(&json!({"result": "done"})));
}

/// Every task gets one running event and exactly one terminal event.
#[tokio::test]
async fn test_progress_events_per_task() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("b", Duration::ZERO, Script::Fail("nope".to_string()));
    let engine = engine_with(worker, FailurePolicy::BestEffort, TIMEOUT);
    let recorder = Recorder::default();
    let wf = Workflow::new(
        "events",
        vec![scripted("a", &[]), scripted("b", &[]), scripted("c", &["b"])],
    );

    engine
        .run_with(WorkflowId::new(), &wf, Arc::new(recorder.notifier()))
        .await
        .unwrap();

    for task in ["a", "b", "c"] {
        assert_eq!(recorder.terminal_for(task).len(), 1, "task {}", task);
    }
    let events = recorder.events();
    let running: Vec<_> = events
        .iter()
        .filter(|e| e.status == StepStatus::Running)
        .map(|e| e.task_id.as_str().to_string())
        .collect();
    assert_eq!(running.len(), 2);
    assert!(!running.contains(&"c".to_string()));

    let completed_a = &recorder.terminal_for("a")[0];
    assert_eq!(completed_a.outcome, StepOutcome::Output(json!({"task": "a"})));
}
