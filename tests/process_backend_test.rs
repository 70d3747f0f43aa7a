use taskflow::actions::demos;
use taskflow::backends::{ExecutionBackend, ProcessBackend};
use taskflow::config::{EngineConfig, FailurePolicy};
use taskflow::dsl::builder::FlowBuilder;
use taskflow::runtime::context::ContextSnapshot;
use taskflow::runtime::engine::FlowExecutor;
use taskflow::runtime::outcome::{FailureKind, Outcome};
use taskflow::runtime::resolver::TaskResolver;
use taskflow::runtime::task::{Isolation, TaskReference, UnitPath};
use serde_json::{Map, json};
use std::path::PathBuf;
use std::sync::Arc;

fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_taskflow_worker"))
}

fn config() -> EngineConfig {
    EngineConfig::default().with_worker_program(worker_program())
}

fn path(unit: &str) -> TaskReference {
    TaskReference::Path(UnitPath::new(unit))
}

#[tokio::test]
async fn test_process_isolation_scenario() {
    let mut r = TaskResolver::new(Arc::new(demos::catalog()));
    r.bind_path("taskA", "demos/one", Isolation::Process)
        .bind_path("taskB", "demos/two", Isolation::Process)
        .bind_path("taskC", "demos/three", Isolation::Process)
        .bind_path("taskD", "demos/sum", Isolation::Process);
    let flow = FlowBuilder::new()
        .task("taskA")
        .group(["taskB", "taskC"])
        .task("taskD")
        .build();

    let executor = FlowExecutor::new(r, config());
    let outcome = executor.run(&flow, Map::new()).await;
    executor.shutdown().await;

    assert!(outcome.is_completed(), "aborted: {:?}", outcome.error());
    let store = outcome.store();
    assert_eq!(store.task_ids(), vec!["taskA", "taskB", "taskC", "taskD"]);
    assert_eq!(store.value("taskD"), Some(&json!(6)));
}

#[tokio::test]
async fn test_all_isolations_agree() {
    let flow = FlowBuilder::new()
        .task("first")
        .group(["keys", "add"])
        .task("report")
        .build();
    let mut initial = Map::new();
    initial.insert("initialData".to_string(), json!(7));

    let mut stores = Vec::new();
    for isolation in [Isolation::InProcess, Isolation::Thread, Isolation::Process] {
        let mut r = TaskResolver::new(Arc::new(demos::catalog()));
        r.bind_path("first", "demos/fail", isolation)
            .bind_path("keys", "demos/snapshot_keys", isolation)
            .bind_path("add", "demos/add_initial", isolation)
            .bind_path("report", "demos/report", isolation);

        let executor = FlowExecutor::new(r, config().with_policy(FailurePolicy::ContinueAndRecord));
        let store = executor.run(&flow, initial.clone()).await.into_store();
        executor.shutdown().await;
        stores.push(store);
    }

    assert_eq!(stores[0].value("add"), Some(&json!(57)));
    assert_eq!(stores[0].value("keys"), Some(&json!(["first"])));
    assert_eq!(stores[0], stores[1]);
    assert_eq!(stores[1], stores[2]);
}

#[tokio::test]
async fn test_crashed_worker_is_transport_failure_and_pool_recovers() {
    let backend = ProcessBackend::new(worker_program(), Vec::new(), 1);
    let snapshot = Arc::new(ContextSnapshot::default());

    let crashed = backend.execute("crash", &path("demos/exit"), snapshot.clone()).await;
    let error = crashed.error().expect("crash should be a failure");
    assert_eq!(error.kind, FailureKind::Transport);
    assert!(error.message.contains("exited before responding"), "{}", error.message);
    assert_eq!(backend.idle_workers(), 0);

    // A fresh child replaces the dead one.
    let next = backend.execute("next", &path("demos/two"), snapshot).await;
    assert_eq!(next, Outcome::Success(json!(2)));
    assert_eq!(backend.idle_workers(), 1);

    backend.shutdown().await;
    assert_eq!(backend.idle_workers(), 0);
}

#[tokio::test]
async fn test_unit_errors_come_back_as_execution_failures() {
    let backend = ProcessBackend::new(worker_program(), Vec::new(), 1);
    let snapshot = Arc::new(ContextSnapshot::default());

    let failed = backend.execute("bad", &path("demos/fail"), snapshot.clone()).await;
    assert_eq!(failed.error().map(|e| e.kind), Some(FailureKind::Execution));

    let missing = backend.execute("missing", &path("demos/nope"), snapshot).await;
    let error = missing.error().expect("missing unit should fail");
    assert_eq!(error.kind, FailureKind::Execution);
    assert!(error.message.starts_with("Unit loading failed"), "{}", error.message);

    // The worker that reported both errors is still healthy and pooled.
    assert_eq!(backend.idle_workers(), 1);
    backend.shutdown().await;
}

#[tokio::test]
async fn test_missing_worker_program_is_transport_failure() {
    let backend = ProcessBackend::new(PathBuf::from("/nonexistent/taskflow_worker"), Vec::new(), 1);
    let outcome = backend.execute("a", &path("demos/one"), Arc::new(ContextSnapshot::default())).await;
    assert_eq!(outcome.error().map(|e| e.kind), Some(FailureKind::Transport));
}

#[tokio::test]
async fn test_fail_fast_on_crashed_worker() {
    let mut r = TaskResolver::new(Arc::new(demos::catalog()));
    r.bind_path("ok", "demos/one", Isolation::InProcess)
        .bind_path("crash", "demos/exit", Isolation::Process)
        .bind_path("never", "demos/two", Isolation::InProcess);
    let flow = FlowBuilder::new().task("ok").task("crash").task("never").build();

    let executor = FlowExecutor::new(r, config());
    let outcome = executor.run(&flow, Map::new()).await;
    executor.shutdown().await;

    assert!(!outcome.is_completed());
    let store = outcome.store();
    assert_eq!(store.value("ok"), Some(&json!(1)));
    assert_eq!(store.get("crash").and_then(Outcome::error).map(|e| e.kind), Some(FailureKind::Transport));
    assert!(store.get("never").is_none());
}

#[tokio::test]
async fn test_execute_after_shutdown_is_rejected() {
    let backend = ProcessBackend::new(worker_program(), Vec::new(), 2);
    backend.shutdown().await;
    let outcome = backend.execute("late", &path("demos/one"), Arc::new(ContextSnapshot::default())).await;
    assert_eq!(outcome.error().map(|e| e.kind), Some(FailureKind::Transport));
}

#[tokio::test]
async fn test_idle_worker_killed_externally_is_replaced() {
    let backend = ProcessBackend::new(worker_program(), vec!["--name".to_string(), "idle-kill".to_string()], 1);
    assert_eq!(backend.isolation(), Isolation::Process);
    assert_eq!(backend.program(), worker_program().as_path());
    let snapshot = Arc::new(ContextSnapshot::default());

    let first = backend.execute("first", &path("demos/one"), snapshot.clone()).await;
    assert_eq!(first, Outcome::Success(json!(1)));
    let pids = backend.idle_pids();
    assert_eq!(pids.len(), 1);

    let status = std::process::Command::new("kill")
        .arg("-9")
        .arg(pids[0].to_string())
        .status()
        .expect("run kill");
    assert!(status.success());
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let second = backend.execute("second", &path("demos/two"), snapshot).await;
    assert_eq!(second, Outcome::Success(json!(2)));
    assert_eq!(backend.idle_workers(), 1);
    assert_ne!(backend.idle_pids(), pids);

    backend.shutdown().await;
}
