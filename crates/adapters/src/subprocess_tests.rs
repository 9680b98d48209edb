// SPDX-License-Identifier: MIT

use super::*;
use oj_core::policy::NetworkPolicy;
use oj_core::test_support::{job_spec, step};
use oj_core::{ExecutionPolicy, Redactor};
use std::collections::BTreeSet;

fn policy(allowed: &[&str]) -> ExecutionPolicy {
    ExecutionPolicy {
        allowed_binaries: allowed.iter().map(|s| s.to_string()).collect(),
        network_policy: NetworkPolicy::Allow,
        env_allowlist: BTreeSet::new(),
        ..Default::default()
    }
}

fn context(tmp: &tempfile::TempDir, mut step_spec: oj_core::StepSpec, policy: ExecutionPolicy, prompt: &str) -> StepContext {
    step_spec.prompt = prompt.to_string();
    StepContext {
        job: job_spec("j1", vec![step_spec.clone()]),
        step: step_spec,
        policy,
        step_dir: tmp.path().join("step"),
        workspace_dir: tmp.path().to_path_buf(),
        redactor: Redactor::default(),
        attempt: 1,
        timeout: std::time::Duration::from_secs(5),
        cancel: tokio_util::sync::CancellationToken::new(),
    }
}

#[tokio::test]
async fn successful_run_writes_artifacts_and_ok_status() {
    let tmp = tempfile::tempdir().unwrap();
    let worker = SubprocessWorker::new(true).with_agent(
        "echoer",
        AgentBinary { binary: "echo".to_string(), args: vec!["{prompt}".to_string()] },
    );
    let mut spec = step("01_plan", "echoer");
    spec.prompt = "hello".to_string();
    let ctx = context(&tmp, spec, policy(&["echo"]), "hello");
    let outcome = worker.run(&ctx).await;
    assert!(matches!(outcome.status, oj_core::StepStatus::Ok));
    assert!(ctx.step_dir.join("logs.txt").exists());
    let logs = std::fs::read_to_string(ctx.step_dir.join("logs.txt")).unwrap();
    assert!(logs.contains("hello"));
}

#[tokio::test]
async fn binary_not_on_allowlist_fails_as_policy_violation() {
    let tmp = tempfile::tempdir().unwrap();
    let worker = SubprocessWorker::new(true).with_agent(
        "echoer",
        AgentBinary { binary: "echo".to_string(), args: vec![] },
    );
    let spec = step("01_plan", "echoer");
    let ctx = context(&tmp, spec, policy(&["other"]), "");
    let outcome = worker.run(&ctx).await;
    assert!(matches!(outcome.status, oj_core::StepStatus::Failed));
    assert_eq!(outcome.error.unwrap().code, "policy_violation");
}

#[tokio::test]
async fn nonzero_exit_is_reported_as_subprocess_exit_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    let worker = SubprocessWorker::new(true).with_agent(
        "failer",
        AgentBinary { binary: "sh".to_string(), args: vec!["-c".to_string(), "exit 7".to_string()] },
    );
    let spec = step("01_plan", "failer");
    let ctx = context(&tmp, spec, policy(&["sh"]), "");
    let outcome = worker.run(&ctx).await;
    assert!(matches!(outcome.status, oj_core::StepStatus::Failed));
    assert_eq!(outcome.error.unwrap().code, "subprocess_exit_nonzero");
}

#[tokio::test]
async fn unregistered_agent_is_worker_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let worker = SubprocessWorker::new(true);
    let spec = step("01_plan", "ghost");
    let ctx = context(&tmp, spec, policy(&["echo"]), "");
    let outcome = worker.run(&ctx).await;
    assert_eq!(outcome.error.unwrap().code, "worker_not_found");
}
