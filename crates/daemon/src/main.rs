// SPDX-License-Identifier: MIT

//! `ojd` — the always-on orchestrator process. Runs the step runner, the
//! cron scheduler, and the retention sweeper as independent tasks against
//! the same filesystem queue, so a crash or restart never loses a job:
//! everything durable lives under `Config::queue_root`/`artifacts_root`/
//! `workspaces_root`, not in this process's memory.

use chrono::Utc;
use fs2::FileExt;
use oj_adapters::{AgentBinary, ApiWorker, ReqwestApiClient, SimulationWorker, SubprocessWorker, WorkerRegistry};
use oj_core::{Clock, Config, OjError, SystemClock};
use oj_engine::{load_entries_from_file, sweep, BudgetGate, CronScheduler, JobOutcome, Runner};
use oj_storage::{ArtifactStore, Queue};
use oj_workspace::WorkspaceManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let _lock = match acquire_lock(&config) {
        Ok(lock) => lock,
        Err(e) => {
            error!("failed to start: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let registry = build_registry(&config);
    let cancel = CancellationToken::new();

    let runner_task = tokio::spawn(runner_loop(config.clone(), registry, cancel.child_token()));
    let scheduler_task = tokio::spawn(scheduler_loop(config.clone(), cancel.child_token()));
    let retention_task = tokio::spawn(retention_loop(config.clone(), cancel.child_token()));

    info!("ojd started, queue_root={}", config.queue_root.display());
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining (grace={:?})", config.shutdown_grace);
    cancel.cancel();

    let drain = async {
        let _ = runner_task.await;
        let _ = scheduler_task.await;
        let _ = retention_task.await;
    };
    if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
        warn!("shutdown grace period elapsed before all tasks drained");
    }
    info!("ojd stopped");
    std::process::ExitCode::SUCCESS
}

/// A single `ojd` instance owns `queue_root`; a second instance racing the
/// same queue would double-claim jobs, so refuse to start rather than
/// corrupting state.
fn acquire_lock(config: &Config) -> Result<std::fs::File, OjError> {
    std::fs::create_dir_all(&config.queue_root)?;
    let lock_path = config.queue_root.join(".daemon.lock");
    let file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
    file.try_lock_exclusive()
        .map_err(|e| OjError::Validation(format!("another ojd instance holds {}: {e}", lock_path.display())))?;
    Ok(file)
}

/// Builds the worker registry from environment-driven wiring:
/// `AGENT_BINARIES=name=binary[;name=binary...]` for subprocess agents and
/// `AGENT_API_ENDPOINTS=name=url[;name=url...]` for remote agents.
/// `sim` is always registered so the daemon runs end-to-end with neither set.
fn build_registry(config: &Config) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new().register("sim", Arc::new(SimulationWorker::new()));

    let mut subprocess = SubprocessWorker::new(config.enable_real_cli).with_min_versions(config.min_binary_versions.clone());
    let mut has_subprocess_agents = false;
    for (agent, binary) in parse_semicolon_map("AGENT_BINARIES") {
        has_subprocess_agents = true;
        subprocess = subprocess.with_agent(agent, AgentBinary { binary, args: vec!["{prompt}".to_string()] });
    }
    if has_subprocess_agents {
        registry = registry.register("subprocess", Arc::new(subprocess));
    }

    let api_endpoints = parse_semicolon_map("AGENT_API_ENDPOINTS");
    if !api_endpoints.is_empty() {
        match ReqwestApiClient::new(Duration::from_secs(60)) {
            Ok(client) => {
                let mut api_worker = ApiWorker::new(Arc::new(client));
                for (agent, url) in api_endpoints {
                    api_worker = api_worker.with_endpoint(agent, url);
                }
                registry = registry.register("api", Arc::new(api_worker));
            }
            Err(e) => warn!("failed to build reqwest client for api worker: {e}"),
        }
    }

    registry
}

fn parse_semicolon_map(key: &str) -> Vec<(String, String)> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(';')
                .filter_map(|entry| entry.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

async fn runner_loop(config: Config, registry: WorkerRegistry, cancel: CancellationToken) {
    let mut runner = match build_runner(&config, registry) {
        Ok(runner) => runner,
        Err(e) => {
            error!("runner task failed to start: {e}");
            return;
        }
    };

    while !cancel.is_cancelled() {
        if let Err(e) = runner.queue.reclaim_stale_running(config.runner_reclaim_after, config.max_reclaim_attempts) {
            warn!("reclaim pass failed: {e}");
        }

        match runner.run_one().await {
            Ok(JobOutcome::Completed(terminal)) => info!("job completed: {terminal:?}"),
            Ok(JobOutcome::QueueEmpty) => {
                tokio::select! {
                    _ = tokio::time::sleep(config.runner_poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            Err(e) => {
                error!("runner loop error: {e}");
                tokio::select! {
                    _ = tokio::time::sleep(config.runner_poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
}

fn build_runner(config: &Config, registry: WorkerRegistry) -> Result<Runner<SystemClock>, OjError> {
    let queue = Queue::open(&config.queue_root)?;
    let store = ArtifactStore::new(&config.artifacts_root);
    let workspace = WorkspaceManager::new(&config.workspaces_root);
    let budget = BudgetGate::open(&config.budget_db_path, config.max_daily_api_calls, config.max_daily_cost_usd)?;
    Ok(Runner { queue, store, workspace, registry, config: config.clone(), budget, clock: SystemClock })
}

async fn scheduler_loop(config: Config, cancel: CancellationToken) {
    let queue = match Queue::open(&config.queue_root) {
        Ok(queue) => queue,
        Err(e) => {
            error!("scheduler task failed to open queue: {e}");
            return;
        }
    };
    let entries = match &config.scheduler_config_path {
        Some(path) => match load_entries_from_file(path) {
            Ok(entries) => entries,
            Err(e) => {
                error!("failed to load schedule config {}: {e}", path.display());
                return;
            }
        },
        None => Vec::new(),
    };
    if entries.is_empty() {
        info!("no SCHEDULER_CONFIG_PATH configured, scheduler idle");
    }
    let mut scheduler = match CronScheduler::load(entries, config.scheduler_state_path.clone(), SystemClock.now_utc()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("failed to load scheduler state: {e}");
            return;
        }
    };

    while !cancel.is_cancelled() {
        match scheduler.tick(&queue, Utc::now()) {
            Ok(fired) => {
                for name in fired {
                    info!(schedule = %name, "cron schedule fired");
                }
            }
            Err(e) => warn!("scheduler tick failed: {e}"),
        }
        tokio::select! {
            _ = tokio::time::sleep(config.scheduler_tick_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
}

async fn retention_loop(config: Config, cancel: CancellationToken) {
    let queue = match Queue::open(&config.queue_root) {
        Ok(queue) => queue,
        Err(e) => {
            error!("retention task failed to open queue: {e}");
            return;
        }
    };

    while !cancel.is_cancelled() {
        match sweep(&queue, &config.artifacts_root, &config.workspaces_root, config.artifacts_ttl, config.workspaces_ttl) {
            Ok(report) => {
                if !report.artifacts_reaped.is_empty() || !report.workspaces_reaped.is_empty() {
                    info!(
                        artifacts = report.artifacts_reaped.len(),
                        workspaces = report.workspaces_reaped.len(),
                        "retention sweep reaped aged-out directories"
                    );
                }
            }
            Err(e) => warn!("retention sweep failed: {e}"),
        }
        tokio::select! {
            _ = tokio::time::sleep(config.retention_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let term = signal(SignalKind::terminate());
    let int = signal(SignalKind::interrupt());
    match (term, int) {
        (Ok(mut term), Ok(mut int)) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
            }
        }
        _ => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
