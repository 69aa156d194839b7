//! Task lifecycle around the engine: stop, resume, admission.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{engine_config, Harness, PATCHED_SOURCE, VAULT_SOURCE};
use redline::adapters::sqlite::SqliteTaskRepository;
use redline::adapters::tools::{regression_report, MockStep};
use redline::domain::errors::{DomainError, DomainResult};
use redline::domain::models::{CaseStatus, RoutineOutcome, RunVerdict, TaskStatus};
use redline::domain::ports::{ExploitGenerator, TaskRepository};
use redline::services::{ExecutionScheduler, ToolSet};

const REENTRANCY: &str = "testExploit_Reentrancy_01";

/// Exploit generator that simulates a stop arriving mid-round.
struct StopDuringWeaponize {
    token: Option<CancellationToken>,
    row: Option<(Arc<SqliteTaskRepository>, Uuid)>,
}

#[async_trait]
impl ExploitGenerator for StopDuringWeaponize {
    fn name(&self) -> &'static str {
        "exploit generator"
    }

    async fn generate(&self, _source: &str, _report: &str) -> DomainResult<String> {
        if let Some((tasks, id)) = &self.row {
            let mut task = tasks.get(*id).await?.expect("task exists");
            task.transition_to(TaskStatus::Stopped).expect("running task can stop");
            tasks.update(&task).await?;
        }
        if let Some(token) = &self.token {
            token.cancel();
        }
        Ok("// no exploit".to_string())
    }
}

fn with_generator(h: &Harness, generator: StopDuringWeaponize) -> ToolSet {
    ToolSet { exploit_generator: Arc::new(generator), ..h.tools() }
}

#[tokio::test]
async fn test_stop_mid_run_ends_at_next_boundary() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    let token = CancellationToken::new();

    let tools = with_generator(
        &h,
        StopDuringWeaponize { token: Some(token.clone()), row: Some((Arc::clone(&h.tasks), task.id)) },
    );
    let runner = redline::services::HardeningRunner::new(Arc::clone(&h.tasks), h.engine_with(tools, engine_config(5)));

    let verdict = runner.run(task.id, token).await.unwrap();

    assert_eq!(verdict, RunVerdict::Stopped { rounds: 0 });
    assert!(h.runner.patterns().await.is_empty(), "gatekeeper and regression never ran");
    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Stopped);
    assert_eq!(row.result_summary.as_deref(), Some("Task stopped during execution."));
}

#[tokio::test]
async fn test_stop_written_during_run_is_not_overwritten() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    // Row goes to stopped but nobody cancels this process's token
    let tools = with_generator(&h, StopDuringWeaponize { token: None, row: Some((Arc::clone(&h.tasks), task.id)) });
    let runner = redline::services::HardeningRunner::new(Arc::clone(&h.tasks), h.engine_with(tools, engine_config(5)));

    let verdict = runner.run(task.id, CancellationToken::new()).await.unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 0 });
    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Stopped);
    assert_eq!(row.result_summary, None);
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_row_alone() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    let token = CancellationToken::new();
    token.cancel();

    let verdict = h.task_runner(engine_config(5)).run(task.id, token).await.unwrap();

    assert_eq!(verdict, RunVerdict::Stopped { rounds: 0 });
    assert_eq!(h.task(&task).await.status, TaskStatus::Uploaded);
    assert!(h.analyzer.scanned_versions().await.is_empty());
}

#[tokio::test]
async fn test_failed_run_resumes_from_persisted_round() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
        .await;
    h.runner.push(MockStep::Fatal("docker daemon unavailable".to_string())).await;
    h.patches.push(MockStep::Return(PATCHED_SOURCE.to_string())).await;

    let first = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(first, RunVerdict::ToolFailure { .. }));
    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Failed);
    assert_eq!(row.round_count, 1);
    assert_eq!(row.current_source.as_deref(), Some(PATCHED_SOURCE));

    // Resume: nothing new in round 1, regression finally runs and holds
    h.runner.push(MockStep::Return(Default::default())).await;
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Failure)])))
        .await;

    let second = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second, RunVerdict::Secure { rounds: 2 });
    assert_eq!(h.analyzer.scanned_versions().await, vec!["v1", "v2", "v3"]);
    assert_eq!(h.exploits.calls().await[1].0, PATCHED_SOURCE);
    assert_eq!(h.matrix(&task).await, vec![(REENTRANCY.to_string(), CaseStatus::Passing)]);

    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Completed);
    assert_eq!(row.original_source.as_deref(), Some(VAULT_SOURCE));
}

#[tokio::test]
async fn test_run_rejected_for_invalid_states() {
    let h = Harness::new().await;
    let runner = h.task_runner(engine_config(5));

    let created = h.service().create("empty").await.unwrap();
    let err = runner.run(created.id, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    let task = h.uploaded_task(VAULT_SOURCE).await;
    runner.run(task.id, CancellationToken::new()).await.unwrap();
    assert_eq!(h.task(&task).await.status, TaskStatus::Completed);
    let err = runner.run(task.id, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));

    let err = runner.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn test_scheduler_runs_tasks_to_completion() {
    let h = Harness::new().await;
    let runner = h.task_runner(engine_config(5));
    let scheduler = ExecutionScheduler::new(1);

    let mut handles = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let task = h.uploaded_task(VAULT_SOURCE).await;
        ids.push(task.id);
        let runner = runner.clone();
        let id = task.id;
        handles.push(
            scheduler
                .submit(id, move |token| async move { runner.run(id, token).await })
                .await
                .unwrap(),
        );
    }

    for handle in handles {
        let verdict = handle.join().await.unwrap().unwrap();
        assert_eq!(verdict, RunVerdict::Secure { rounds: 0 });
    }
    for id in ids {
        let row = h.tasks.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
    }
    assert_eq!(scheduler.in_flight(), 0);
}

#[tokio::test]
async fn test_shutdown_before_admission_stops_without_running() {
    let h = Harness::new().await;
    let runner = h.task_runner(engine_config(5));
    let scheduler = ExecutionScheduler::new(1);
    let task = h.uploaded_task(VAULT_SOURCE).await;

    scheduler.shutdown();
    let id = task.id;
    let handle = scheduler
        .submit(id, move |token| async move { runner.run(id, token).await })
        .await
        .unwrap();

    let verdict = handle.join().await.unwrap().unwrap();
    assert_eq!(verdict, RunVerdict::Stopped { rounds: 0 });
    assert_eq!(h.task(&task).await.status, TaskStatus::Uploaded);
}

#[tokio::test]
async fn test_request_stop_cancels_owned_run() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    let scheduler = ExecutionScheduler::new(1);

    // A stand-in run that only ends when cancelled
    let handle = scheduler
        .submit(task.id, |token| async move { token.cancelled().await })
        .await
        .unwrap();

    let stopped = h.service().request_stop(task.id, Some(&scheduler)).await.unwrap();
    assert_eq!(stopped.status, TaskStatus::Stopped);
    handle.join().await.unwrap();
}
