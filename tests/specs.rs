// SPDX-License-Identifier: MIT

//! End-to-end scenarios driving the full `oj-storage` + `oj-workspace` +
//! `oj-adapters` + `oj-engine` stack together, the way the daemon wires
//! them, without any of the crates mocked out.

use oj_adapters::{AgentBinary, SimulationWorker, StepContext, StepOutcome, SubprocessWorker, Worker, WorkerRegistry};
use oj_core::test_support::{job_spec, step};
use oj_core::{Config, FakeClock, OnFailure, StepId};
use oj_engine::{BudgetGate, Runner};
use oj_storage::{ArtifactStore, Queue, QueueDir, Terminal};
use oj_workspace::WorkspaceManager;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn init_git_repo(dir: &std::path::Path) {
    let run = |args: &[&str]| {
        std::process::Command::new("git").args(args).current_dir(dir).status().unwrap();
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "test"]);
    std::fs::write(dir.join("README.md"), "hi").unwrap();
    run(&["add", "."]);
    run(&["commit", "-q", "-m", "init"]);
}

struct Fixture {
    _tmp: tempfile::TempDir,
    runner: Runner<FakeClock>,
}

fn fixture(registry: WorkerRegistry) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    init_git_repo(&source);

    let mut aliases = BTreeMap::new();
    aliases.insert("demo".to_string(), source);
    let mut config = Config::from_lookup(|_| None);
    config.project_aliases = aliases;
    config.default_step_timeout = Duration::from_secs(5);
    config.runner_max_attempts_per_step = 3;

    let queue = Queue::open(tmp.path().join("queue")).unwrap();
    let store = ArtifactStore::new(tmp.path().join("artifacts"));
    let workspace = WorkspaceManager::new(tmp.path().join("workspaces"));
    let budget = BudgetGate::open_in_memory(10_000, 10_000.0).unwrap();

    let runner = Runner { queue, store, workspace, registry, config, budget, clock: FakeClock::new() };
    Fixture { _tmp: tmp, runner }
}

fn demo_job(job_id: &str, steps: Vec<oj_core::StepSpec>) -> oj_core::JobSpec {
    let mut spec = job_spec(job_id, steps);
    spec.workdir = oj_core::WorkDir::ProjectId("demo".to_string());
    spec
}

#[tokio::test]
async fn simple_three_step_job_runs_to_completion() {
    let registry = WorkerRegistry::new().register("sim", Arc::new(SimulationWorker::new()));
    let mut fx = fixture(registry);

    let spec = demo_job(
        "job-simple",
        vec![step("01_plan", "sim"), step("02_impl", "sim"), step("03_review", "sim")],
    );
    fx.runner.queue.enqueue(&spec).unwrap();

    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Done));

    let result = fx.runner.store.read_text("job-simple", "result.json").unwrap().unwrap();
    assert!(result.contains("\"status\": \"ok\""));
    for step_id in ["01_plan", "02_impl", "03_review"] {
        assert!(fx.runner.store.exists("job-simple", &format!("steps/{step_id}/report.md")).unwrap());
    }
}

#[tokio::test]
async fn resubmitting_the_same_job_id_is_rejected() {
    let registry = WorkerRegistry::new().register("sim", Arc::new(SimulationWorker::new()));
    let mut fx = fixture(registry);

    let spec = demo_job("job-dup", vec![step("01_plan", "sim")]);
    fx.runner.queue.enqueue(&spec).unwrap();

    let second = fx.runner.queue.enqueue(&spec);
    assert!(matches!(second, Err(oj_core::OjError::DuplicateJob(_))));

    // still true once the first copy has moved on to a terminal directory
    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Done));
    let third = fx.runner.queue.enqueue(&spec);
    assert!(matches!(third, Err(oj_core::OjError::DuplicateJob(_))));
}

#[tokio::test]
async fn exhausted_retries_escalate_via_goto_to_a_recovery_step() {
    let worker = SimulationWorker::new().with_scripted_delays(
        "01_flaky",
        vec![Duration::from_millis(120), Duration::from_millis(120)],
    );
    let registry = WorkerRegistry::new().register("sim", Arc::new(worker));
    let mut fx = fixture(registry);
    fx.runner.config.default_step_timeout = Duration::from_millis(20);

    let mut flaky = step("01_flaky", "sim");
    flaky.max_attempts = Some(2);
    flaky.on_failure = OnFailure::Goto(StepId::parse("02_recover").unwrap());
    let spec = demo_job("job-timeout-goto", vec![flaky, step("02_recover", "sim")]);
    fx.runner.queue.enqueue(&spec).unwrap();

    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Done));

    let flaky_result =
        fx.runner.store.read_text("job-timeout-goto", "steps/01_flaky/result.json").unwrap().unwrap();
    assert!(flaky_result.contains("\"attempts\": 2"));
    assert!(flaky_result.contains("\"timeout\""));
    assert!(fx.runner.store.exists("job-timeout-goto", "steps/02_recover/report.md").unwrap());
}

#[test]
fn stale_running_jobs_are_reclaimed_until_the_retry_cap_fails_them() {
    let tmp = tempfile::tempdir().unwrap();
    let queue = Queue::open(tmp.path().join("queue")).unwrap();

    let spec = demo_job("job-crash-loop", vec![step("01_plan", "sim")]);
    queue.enqueue(&spec).unwrap();

    // Each iteration claims the job (pending -> running) then immediately
    // reclaims it as stale, simulating a runner process dying mid-step.
    // With max_reclaim_attempts=3, the 4th reclaim moves it to failed/.
    for _ in 0..3 {
        queue.claim().unwrap();
        let outcomes = queue.reclaim_stale_running(Duration::ZERO, 3).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], oj_storage::ReclaimOutcome::Requeued(_, _)));
        assert_eq!(queue.locate("job-crash-loop").unwrap(), Some(QueueDir::Pending));
    }

    queue.claim().unwrap();
    let outcomes = queue.reclaim_stale_running(Duration::ZERO, 3).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], oj_storage::ReclaimOutcome::Failed(_)));
    assert_eq!(queue.locate("job-crash-loop").unwrap(), Some(QueueDir::Failed));
}

#[tokio::test]
async fn ask_human_job_can_be_approved_and_reprocessed() {
    let registry = WorkerRegistry::new().register("sim", Arc::new(SimulationWorker::new()));
    let mut fx = fixture(registry);

    let mut needs_human = step("01_plan", "ghost");
    needs_human.on_failure = OnFailure::AskHuman;
    let spec = demo_job("job-needs-human", vec![needs_human, step("02_impl", "sim")]);
    fx.runner.queue.enqueue(&spec).unwrap();

    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::AwaitingApproval));
    assert_eq!(fx.runner.queue.locate("job-needs-human").unwrap(), Some(QueueDir::AwaitingApproval));

    fx.runner.queue.approve("job-needs-human").unwrap();
    assert_eq!(fx.runner.queue.locate("job-needs-human").unwrap(), Some(QueueDir::Pending));

    // Resumes at 02_impl instead of re-asking at 01_plan.
    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Done));
    assert!(fx.runner.store.exists("job-needs-human", "steps/02_impl/report.md").unwrap());
}

#[tokio::test]
async fn disallowed_binary_is_refused_before_spawning() {
    let worker = SubprocessWorker::new(true)
        .with_agent("shell", AgentBinary { binary: "curl".to_string(), args: vec![] });
    let registry = WorkerRegistry::new().register("shell", Arc::new(worker));
    let mut fx = fixture(registry);

    let spec = demo_job("job-policy-violation", vec![step("01_fetch", "shell")]);
    fx.runner.queue.enqueue(&spec).unwrap();

    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Failed));

    let step_result =
        fx.runner.store.read_text("job-policy-violation", "steps/01_fetch/result.json").unwrap().unwrap();
    assert!(step_result.contains("policy_violation"));
}

/// Sanity check that the `Worker` trait object used above is the real
/// contract the daemon registers against, not a test-only shim.
#[tokio::test]
async fn worker_trait_object_is_usable_through_the_registry() {
    struct EchoWorker;
    #[async_trait::async_trait]
    impl Worker for EchoWorker {
        async fn run(&self, ctx: &StepContext) -> StepOutcome {
            std::fs::create_dir_all(&ctx.step_dir).unwrap();
            std::fs::write(ctx.step_dir.join("report.md"), "echo").unwrap();
            std::fs::write(ctx.step_dir.join("patch.diff"), "").unwrap();
            std::fs::write(ctx.step_dir.join("logs.txt"), "").unwrap();
            StepOutcome::ok()
        }
    }

    let registry = WorkerRegistry::new().register("echo", Arc::new(EchoWorker));
    let mut fx = fixture(registry);
    let spec = demo_job("job-echo", vec![step("01_echo", "echo")]);
    fx.runner.queue.enqueue(&spec).unwrap();

    let outcome = fx.runner.run_one().await.unwrap();
    assert_eq!(outcome, oj_engine::JobOutcome::Completed(Terminal::Done));
}
