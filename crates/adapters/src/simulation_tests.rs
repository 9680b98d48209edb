// SPDX-License-Identifier: MIT

use super::*;
use oj_core::test_support::{job_spec, step};
use oj_core::{ExecutionPolicy, Redactor};

fn context(tmp: &tempfile::TempDir, step_spec: oj_core::StepSpec, attempt: u32) -> StepContext {
    StepContext {
        job: job_spec("j1", vec![step_spec.clone()]),
        step: step_spec,
        policy: ExecutionPolicy::default(),
        step_dir: tmp.path().join("step"),
        workspace_dir: tmp.path().join("work"),
        redactor: Redactor::default(),
        attempt,
        timeout: Duration::from_secs(30),
        cancel: tokio_util::sync::CancellationToken::new(),
    }
}

#[tokio::test]
async fn writes_the_three_required_files() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(&tmp, step("01_plan", "opencode"), 1);
    let worker = SimulationWorker::new();
    let outcome = worker.run(&ctx).await;
    assert!(matches!(outcome.status, oj_core::StepStatus::Ok));
    assert!(ctx.step_dir.join("report.md").exists());
    assert!(ctx.step_dir.join("patch.diff").exists());
    assert!(ctx.step_dir.join("logs.txt").exists());
}

#[tokio::test]
async fn scripted_delay_is_consumed_per_attempt() {
    let tmp = tempfile::tempdir().unwrap();
    let worker = SimulationWorker::new()
        .with_scripted_delays("02_impl", vec![Duration::from_millis(30), Duration::ZERO]);

    let ctx1 = context(&tmp, step("02_impl", "codex"), 1);
    let start = std::time::Instant::now();
    worker.run(&ctx1).await;
    assert!(start.elapsed() >= Duration::from_millis(30));

    let ctx2 = context(&tmp, step("02_impl", "codex"), 2);
    let start = std::time::Instant::now();
    worker.run(&ctx2).await;
    assert!(start.elapsed() < Duration::from_millis(30));
}

#[tokio::test]
async fn cancellation_during_scripted_delay_fails_as_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let worker =
        SimulationWorker::new().with_scripted_delays("01_plan", vec![Duration::from_secs(5)]);
    let ctx = context(&tmp, step("01_plan", "opencode"), 1);
    ctx.cancel.cancel();
    let outcome = worker.run(&ctx).await;
    assert!(matches!(outcome.status, oj_core::StepStatus::Failed));
    assert_eq!(outcome.error.unwrap().code, "timeout");
}

#[tokio::test]
async fn logs_redact_sensitive_prompt_content() {
    let tmp = tempfile::tempdir().unwrap();
    let mut spec = step("01_plan", "opencode");
    spec.prompt = "api_key: abcdef1234567890".to_string();
    let ctx = context(&tmp, spec, 1);
    SimulationWorker::new().run(&ctx).await;
    let logs = std::fs::read_to_string(ctx.step_dir.join("logs.txt")).unwrap();
    assert!(!logs.contains("abcdef1234567890"));
}
