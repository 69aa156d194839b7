//! End-to-end runs of the round engine over SQLite with scripted tools.

mod common;

use common::{engine_config, Harness, PATCHED_SOURCE, VAULT_SOURCE};
use redline::adapters::tools::{regression_report, MockStep};
use redline::adapters::workspace::MATRIX_PATTERN;
use redline::domain::models::{
    CaseOrigin, CaseStatus, EngineConfig, FuzzReport, RoundContext, RoutineOutcome, RunVerdict, TaskStatus,
    WeaponizeFailurePolicy,
};
use redline::domain::ports::ExploitCaseRepository;
use tokio_util::sync::CancellationToken;

const REENTRANCY: &str = "testExploit_Reentrancy_01";

#[tokio::test]
async fn test_clean_contract_is_secure_on_first_round() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 0 });
    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Completed);
    assert_eq!(row.round_count, 0);
    assert_eq!(row.current_phase.as_deref(), Some("Finished"));
    assert_eq!(row.result_summary.as_deref(), Some("All threats mitigated. Contract is secure."));
    assert!(row.finished_at.is_some());
    assert!(h.patches.calls().await.is_empty());
    assert!(h.matrix(&task).await.is_empty());
}

#[tokio::test]
async fn test_patch_that_holds_converges_next_round() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    h.fuzzer
        .push(MockStep::Return(FuzzReport::crashed(500, 2, "test/fuzz/FuzzTest_Round0.t.sol")))
        .await;
    h.exploits.push(MockStep::Return("contract Attack {}".to_string())).await;
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
        .await;
    h.runner
        .push(MockStep::Return(regression_report([
            ("Fuzz_Crash_v1", RoutineOutcome::Failure),
            (REENTRANCY, RoutineOutcome::Failure),
        ])))
        .await;
    h.patches.push(MockStep::Return(PATCHED_SOURCE.to_string())).await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 1 });
    assert_eq!(
        h.matrix(&task).await,
        vec![
            ("Fuzz_Crash_v1".to_string(), CaseStatus::Passing),
            (REENTRANCY.to_string(), CaseStatus::Passing),
        ]
    );

    let cases = h.cases.list_for_task(task.id).await.unwrap();
    assert_eq!(cases[0].origin, CaseOrigin::Fuzz);
    assert_eq!(cases[1].origin, CaseOrigin::Adversarial);
    assert_eq!(cases[1].code, "contract Attack {}");
    assert_eq!(cases[1].version_added, "v1");

    let patch_calls = h.patches.calls().await;
    assert_eq!(patch_calls.len(), 1);
    assert_eq!(patch_calls[0].source, VAULT_SOURCE);
    assert!(patch_calls[0].failing_evidence.contains("// Exploit Fuzz_Crash_v1"));
    assert!(patch_calls[0].failing_evidence.contains(&format!("// Exploit {REENTRANCY}")));

    // Round two works on the patched source
    let generator_calls = h.exploits.calls().await;
    assert_eq!(generator_calls.len(), 2);
    assert_eq!(generator_calls[1].0, PATCHED_SOURCE);
    assert_eq!(h.fuzzer.rounds().await, vec![0, 1]);
    assert_eq!(h.analyzer.scanned_versions().await, vec!["v1", "v2"]);

    let patterns = h.runner.patterns().await;
    assert_eq!(patterns, vec!["test/Red_Exploit_v1.t.sol", MATRIX_PATTERN, "test/Red_Exploit_v2.t.sol"]);

    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Completed);
    assert_eq!(row.round_count, 1);
    assert_eq!(row.current_source.as_deref(), Some(PATCHED_SOURCE));
    assert_eq!(row.fixed_source.as_deref(), Some(PATCHED_SOURCE));
    assert_eq!(row.original_source.as_deref(), Some(VAULT_SOURCE));

    let ws = h.workspace.for_task(task.id);
    assert!(ws.dir().join("Backup_v2.sol").exists());
    assert!(!ws.dir().join("test/Red_Exploit_v1.t.sol").exists());
}

#[tokio::test]
async fn test_persistent_exploit_exhausts_budget() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    let still_works = || MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)]));
    // round 0: weaponize confirms, regression still red
    h.runner.push(still_works()).await;
    h.runner.push(still_works()).await;
    // round 1: nothing new, regression still red
    h.runner.push(MockStep::Return(Default::default())).await;
    h.runner.push(still_works()).await;

    let verdict = h
        .task_runner(engine_config(2))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Exhausted { rounds: 2, active_reds: 1 });
    assert_eq!(h.patches.calls().await.len(), 2);

    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Failed);
    assert_eq!(row.round_count, 2);
    assert_eq!(row.result_summary.as_deref(), Some("Vulnerabilities persist after repair attempts."));
    // Degraded patch generator keeps the current source
    assert_eq!(row.current_source.as_deref(), Some(VAULT_SOURCE));
}

#[tokio::test]
async fn test_broken_fuzzer_fails_task_without_cases() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.fuzzer
        .push(MockStep::Return(FuzzReport::tool_error("forge: command not found")))
        .await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    match &verdict {
        RunVerdict::ToolFailure { reason } => assert!(reason.contains("forge: command not found")),
        other => panic!("expected tool failure, got {other:?}"),
    }
    assert!(h.exploits.calls().await.is_empty());
    assert!(h.matrix(&task).await.is_empty());

    let row = h.task(&task).await;
    assert_eq!(row.status, TaskStatus::Failed);
    assert!(row.result_summary.unwrap().starts_with("System error:"));
}

#[tokio::test]
async fn test_reconfirmed_routine_is_not_a_new_threat() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;

    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
        .await;
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Failure)])))
        .await;
    // Same routine name confirmed again against the patch
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
        .await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 1 });
    assert_eq!(h.matrix(&task).await, vec![(REENTRANCY.to_string(), CaseStatus::Passing)]);
}

#[tokio::test]
async fn test_unreported_case_keeps_status() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.fuzzer
        .push(MockStep::Return(FuzzReport::crashed(500, 1, "test/fuzz/FuzzTest_Round0.t.sol")))
        .await;
    // Regression reports nothing about the fuzz case

    let verdict = h
        .task_runner(engine_config(1))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Exhausted { rounds: 1, active_reds: 1 });
    assert_eq!(h.matrix(&task).await, vec![("Fuzz_Crash_v1".to_string(), CaseStatus::Failing)]);
}

#[tokio::test]
async fn test_uncompilable_candidate_is_fatal_by_default() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.runner.push(MockStep::Fatal("Compilation failed".to_string())).await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(verdict, RunVerdict::ToolFailure { .. }));
    assert_eq!(h.task(&task).await.status, TaskStatus::Failed);
    let candidate = h.workspace.for_task(task.id).dir().join("test/Red_Exploit_v1.t.sol");
    assert!(!candidate.exists());
}

#[tokio::test]
async fn test_uncompilable_candidate_skipped_when_configured() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.runner.push(MockStep::Fatal("Compilation failed".to_string())).await;

    let config = EngineConfig { weaponize_failure: WeaponizeFailurePolicy::SkipRound, ..engine_config(5) };
    let verdict = h.task_runner(config).run(task.id, CancellationToken::new()).await.unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 0 });
}

#[tokio::test]
async fn test_degraded_exploit_generator_stores_placeholder() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.exploits.push(MockStep::Degraded("quota exceeded".to_string())).await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict, RunVerdict::Secure { rounds: 0 });
    assert!(h.runner.patterns().await.is_empty());
    assert_eq!(h.task(&task).await.exploit_source.as_deref(), Some("// Exploit generation failed"));
}

#[tokio::test]
async fn test_hung_tool_times_out() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.analyzer.push(MockStep::Hang).await;

    let config = EngineConfig { tool_timeout_secs: 1, ..engine_config(5) };
    let verdict = h.task_runner(config).run(task.id, CancellationToken::new()).await.unwrap();

    match verdict {
        RunVerdict::ToolFailure { reason } => assert!(reason.contains("did not finish within 1s")),
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert_eq!(h.task(&task).await.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_static_report_reaches_generators() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.analyzer
        .push(MockStep::Return("### Slither Report (v1)\n- reentrancy-eth".to_string()))
        .await;
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
        .await;
    h.runner
        .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Failure)])))
        .await;
    h.patches.push(MockStep::Return(PATCHED_SOURCE.to_string())).await;

    h.task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    let exploit_calls = h.exploits.calls().await;
    assert!(exploit_calls[0].1.contains("reentrancy-eth"));
    let patch_calls = h.patches.calls().await;
    assert!(patch_calls[0].report.contains("reentrancy-eth"));
    // Second scan reported nothing; the stored report is replaced
    assert_eq!(h.task(&task).await.static_report.as_deref(), Some(""));
}

#[tokio::test]
async fn test_fix_sample_is_bounded() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.runner
        .push(MockStep::Return(regression_report([
            ("testExploit_A_01", RoutineOutcome::Success),
            ("testExploit_B_01", RoutineOutcome::Success),
            ("testExploit_C_01", RoutineOutcome::Success),
        ])))
        .await;

    let config = EngineConfig { fix_sample_size: 2, ..engine_config(1) };
    let verdict = h.task_runner(config).run(task.id, CancellationToken::new()).await.unwrap();

    assert_eq!(verdict, RunVerdict::Exhausted { rounds: 1, active_reds: 3 });
    let evidence = &h.patches.calls().await[0].failing_evidence;
    assert!(evidence.contains("testExploit_A_01"));
    assert!(evidence.contains("testExploit_B_01"));
    assert!(!evidence.contains("testExploit_C_01"));
}

#[tokio::test]
async fn test_repeated_discovery_registers_fuzz_case_once() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    for _ in 0..2 {
        h.fuzzer
            .push(MockStep::Return(FuzzReport::crashed(500, 1, "test/fuzz/FuzzCrash_Round0.t.sol")))
            .await;
    }
    let engine = h.engine(engine_config(5));
    let ctx = RoundContext::from_task(&h.task(&task).await).unwrap();

    let first = engine.discover(&ctx).await.unwrap();
    let second = engine.discover(&ctx).await.unwrap();

    assert_eq!(first.new_threats_count, Some(1));
    assert_eq!(second.new_threats_count, Some(0));
    assert_eq!(h.matrix(&task).await, vec![("Fuzz_Crash_v1".to_string(), CaseStatus::Failing)]);
}

#[tokio::test]
async fn test_repeated_weaponize_registers_routine_once() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    for _ in 0..2 {
        h.exploits.push(MockStep::Return("contract Attack {}".to_string())).await;
        h.runner
            .push(MockStep::Return(regression_report([(REENTRANCY, RoutineOutcome::Success)])))
            .await;
    }
    let engine = h.engine(engine_config(5));
    let ctx = RoundContext::from_task(&h.task(&task).await).unwrap();

    let first = engine.weaponize(&ctx).await.unwrap();
    let second = engine.weaponize(&ctx).await.unwrap();

    assert_eq!(first.new_threats_count, Some(1));
    assert_eq!(second.new_threats_count, Some(0));
    assert_eq!(h.matrix(&task).await, vec![(REENTRANCY.to_string(), CaseStatus::Failing)]);
}

#[tokio::test]
async fn test_fuzz_crash_without_evidence_is_not_secure() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.fuzzer.push(MockStep::Return(FuzzReport::crashed_unreproduced(500, 1))).await;

    let verdict = h
        .task_runner(engine_config(5))
        .run(task.id, CancellationToken::new())
        .await
        .unwrap();

    // The crash forces a fix round even though nothing reached the matrix
    assert_eq!(verdict, RunVerdict::Secure { rounds: 1 });
    assert_eq!(h.patches.calls().await.len(), 1);
    assert!(h.matrix(&task).await.is_empty());
}

#[tokio::test]
async fn test_hung_candidate_is_fatal_even_when_skipping_rounds() {
    let h = Harness::new().await;
    let task = h.uploaded_task(VAULT_SOURCE).await;
    h.runner.push(MockStep::Hang).await;

    let config = EngineConfig {
        weaponize_failure: WeaponizeFailurePolicy::SkipRound,
        tool_timeout_secs: 1,
        ..engine_config(5)
    };
    let verdict = h.task_runner(config).run(task.id, CancellationToken::new()).await.unwrap();

    match verdict {
        RunVerdict::ToolFailure { reason } => assert!(reason.contains("did not finish within 1s")),
        other => panic!("expected timeout failure, got {other:?}"),
    }
    assert_eq!(h.task(&task).await.status, TaskStatus::Failed);
}
