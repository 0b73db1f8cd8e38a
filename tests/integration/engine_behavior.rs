//! Wave ordering, concurrency and failure policy behavior.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use taskweave::orchestration::{FailureKind, FailurePolicy};
use taskweave::{EngineState, TaskStatus, Workflow};

use crate::fixtures::{
    chain, engine_with, id, independent, scripted, Journal, Script, ScriptedWorker,
};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Given a chain of 5 tasks
/// Then each runs alone in its own wave, in dependency order
#[tokio::test]
async fn test_chain_runs_sequentially() {
    let journal = Arc::new(Journal::default());
    let engine = engine_with(
        ScriptedWorker::new(Arc::clone(&journal)),
        FailurePolicy::FailFast,
        TIMEOUT,
    );
    let report = engine.run(&Workflow::new("chain", chain(5))).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.waves.len(), 5);
    assert_eq!(journal.started(), vec!["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(journal.max_concurrent(), 1);
    assert_eq!(journal.context_of("t3"), Some(vec!["t2".to_string()]));
}

/// Given 6 independent slow tasks
/// Then all six run in one wave, concurrently
#[tokio::test(start_paused = true)]
async fn test_independent_tasks_run_concurrently() {
    let journal = Arc::new(Journal::default());
    let mut worker = ScriptedWorker::new(Arc::clone(&journal));
    for i in 0..6 {
        worker = worker.script(
            &format!("t{}", i),
            Duration::from_secs(5),
            Script::Output(json!(i)),
        );
    }
    let engine = engine_with(worker, FailurePolicy::FailFast, TIMEOUT);

    let start = tokio::time::Instant::now();
    let report = engine.run(&Workflow::new("wide", independent(6))).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.waves.len(), 1);
    assert_eq!(journal.max_concurrent(), 6);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(report.context.get(&id("t4")), Some(&json!({"result": 4})));
}

/// Every task's wave index is greater than each dependency's
#[tokio::test]
async fn test_wave_index_respects_dependencies() {
    let journal = Arc::new(Journal::default());
    let engine = engine_with(
        ScriptedWorker::new(Arc::clone(&journal)),
        FailurePolicy::FailFast,
        TIMEOUT,
    );
    let tasks = vec![
        scripted("fetch", &[]),
        scripted("parse", &["fetch"]),
        scripted("index", &["parse"]),
        scripted("thumbs", &["fetch"]),
        scripted("publish", &["index", "thumbs"]),
        scripted("notify", &[]),
    ];
    let wf = Workflow::new("site", tasks.clone());
    let report = engine.run(&wf).await.unwrap();
    assert!(report.is_success());

    for task in &tasks {
        let wave = report.wave_of(&task.id).unwrap();
        for dep in &task.dependencies {
            assert!(report.wave_of(dep).unwrap() < wave, "{} before {}", dep, task.id);
        }
    }
    // Predicted levels match what actually ran.
    let levels = wf.graph().unwrap().levels();
    for (index, level) in levels.iter().enumerate() {
        let ran: HashSet<_> = report.waves[index].iter().cloned().collect();
        assert_eq!(&ran, &level.iter().cloned().collect::<HashSet<_>>());
    }
}

/// Given a failing task under best-effort
/// Then its transitive dependents are skipped and unrelated branches finish
#[tokio::test]
async fn test_best_effort_continues_unrelated_branches() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("a", Duration::ZERO, Script::Fail("bad input".to_string()));
    let engine = engine_with(worker, FailurePolicy::BestEffort, TIMEOUT);
    let wf = Workflow::new(
        "branches",
        vec![
            scripted("a", &[]),
            scripted("a2", &["a"]),
            scripted("a3", &["a2", "x"]),
            scripted("x", &[]),
            scripted("x2", &["x"]),
        ],
    );

    let report = engine.run(&wf).await.unwrap();
    assert_eq!(report.state, EngineState::Failed);
    assert!(report.context.contains(&id("x")));
    assert!(report.context.contains(&id("x2")));

    for skipped in ["a2", "a3"] {
        let failure = report.failure_for(&id(skipped)).unwrap();
        assert_eq!(failure.kind, FailureKind::DependencyFailed);
        assert!(matches!(
            report.status_of(&id(skipped)),
            Some(TaskStatus::Failed { .. })
        ));
    }
    assert!(!journal.started().contains(&"a2".to_string()));
    assert!(report.pending().is_empty());
}

/// Under fail-fast a slow sibling of a failing task is cancelled
#[tokio::test(start_paused = true)]
async fn test_fail_fast_cancels_running_siblings() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("bad", Duration::from_millis(10), Script::Fail("boom".to_string()))
        .script("slow", Duration::from_secs(20), Script::Output(json!("late")));
    let engine = engine_with(worker, FailurePolicy::FailFast, TIMEOUT);
    let wf = Workflow::new("cancel", vec![scripted("bad", &[]), scripted("slow", &[])]);

    let start = tokio::time::Instant::now();
    let report = engine.run(&wf).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(20));
    assert_eq!(
        report.failure_for(&id("slow")).unwrap().kind,
        FailureKind::Cancelled
    );
    assert!(report.context.is_empty());
}

/// Under best-effort siblings of a failing task are left to finish
#[tokio::test(start_paused = true)]
async fn test_best_effort_lets_siblings_finish() {
    let journal = Arc::new(Journal::default());
    let worker = ScriptedWorker::new(Arc::clone(&journal))
        .script("bad", Duration::from_millis(10), Script::Fail("boom".to_string()))
        .script("slow", Duration::from_secs(20), Script::Output(json!("late")));
    let engine = engine_with(worker, FailurePolicy::BestEffort, TIMEOUT);
    let wf = Workflow::new("finish", vec![scripted("bad", &[]), scripted("slow", &[])]);

    let report = engine.run(&wf).await.unwrap();
    assert_eq!(report.context.get(&id("slow")), Some(&json!({"result": "late"})));
    assert_eq!(report.errors.len(), 1);
}
