// SPDX-License-Identifier: MIT

//! Process-wide configuration loaded once at startup from environment
//! variables, with documented defaults. Read-only after construction.

use crate::policy::{ExecutionPolicy, NetworkPolicy};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_root: PathBuf,
    pub artifacts_root: PathBuf,
    pub workspaces_root: PathBuf,

    pub enable_real_cli: bool,
    pub default_policy: ExecutionPolicy,
    /// `bin=ver[:cmd]`, default cmd `--version`.
    pub min_binary_versions: BTreeMap<String, (String, String)>,

    pub runner_poll_interval: Duration,
    pub runner_max_idle: Duration,
    pub runner_reclaim_after: Duration,
    pub runner_max_attempts_per_step: u32,
    pub max_reclaim_attempts: u32,
    pub step_transition_limit: u32,
    pub default_step_timeout: Duration,
    pub redact_min_literal_len: usize,

    pub retention_interval: Duration,
    pub artifacts_ttl: Duration,
    pub workspaces_ttl: Duration,

    pub project_aliases: BTreeMap<String, PathBuf>,
    pub allow_absolute_workdir: bool,
    pub non_git_workdir_status: NonGitWorkdirStatus,

    pub budget_db_path: PathBuf,
    pub max_daily_api_calls: i64,
    pub max_daily_cost_usd: f64,

    pub scheduler_tick_interval: Duration,
    pub scheduler_state_path: PathBuf,
    pub scheduler_config_path: Option<PathBuf>,

    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonGitWorkdirStatus {
    NeedsHuman,
    Failed,
}

impl Config {
    /// Loads from the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Loads from an arbitrary key lookup function — used by tests so env
    /// var interaction stays hermetic instead of mutating the real
    /// process environment (which `serial_test` would otherwise require
    /// globally).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.is_empty());
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let state_dir = home.join(".oj");

        let network_policy = match get("NETWORK_POLICY").as_deref() {
            Some("allow") => NetworkPolicy::Allow,
            _ => NetworkPolicy::Deny,
        };

        let default_policy = ExecutionPolicy {
            sandbox: get("SANDBOX").map(|v| v == "1" || v == "true").unwrap_or(false),
            sandbox_wrapper: get("SANDBOX_WRAPPER"),
            sandbox_wrapper_args: get("SANDBOX_WRAPPER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            network_policy,
            allowed_binaries: get("ALLOWED_BINARIES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            env_allowlist: get("ENV_ALLOWLIST")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            sensitive_env_vars: get("SENSITIVE_ENV_VARS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            sandbox_clear_env: get("SANDBOX_CLEAR_ENV").map(|v| v == "1" || v == "true").unwrap_or(false),
            max_input_artifacts_files: get("MAX_INPUT_ARTIFACTS_FILES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            max_input_artifact_chars: get("MAX_INPUT_ARTIFACT_CHARS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(200_000),
            max_input_artifacts_chars_total: get("MAX_INPUT_ARTIFACTS_CHARS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000_000),
        };

        Self {
            queue_root: get("QUEUE_ROOT").map(PathBuf::from).unwrap_or_else(|| state_dir.join("queue")),
            artifacts_root: get("ARTIFACTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("artifacts")),
            workspaces_root: get("WORKSPACES_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("workspaces")),
            enable_real_cli: get("ENABLE_REAL_CLI").map(|v| v == "1" || v == "true").unwrap_or(false),
            default_policy,
            min_binary_versions: env_min_versions_from(&get, "MIN_BINARY_VERSIONS"),
            runner_poll_interval: Duration::from_secs(
                get("RUNNER_POLL_INTERVAL_SEC").and_then(|v| v.parse().ok()).unwrap_or(2),
            ),
            runner_max_idle: Duration::from_secs(
                get("RUNNER_MAX_IDLE_SEC").and_then(|v| v.parse().ok()).unwrap_or(3600),
            ),
            runner_reclaim_after: Duration::from_secs(
                get("RUNNER_RECLAIM_AFTER_SEC").and_then(|v| v.parse().ok()).unwrap_or(600),
            ),
            runner_max_attempts_per_step: get("RUNNER_MAX_ATTEMPTS_PER_STEP")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            max_reclaim_attempts: get("MAX_RECLAIM_ATTEMPTS").and_then(|v| v.parse().ok()).unwrap_or(3),
            step_transition_limit: get("STEP_TRANSITION_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(64),
            default_step_timeout: Duration::from_secs(
                get("DEFAULT_STEP_TIMEOUT_SEC").and_then(|v| v.parse().ok()).unwrap_or(300),
            ),
            redact_min_literal_len: get("REDACT_MIN_LITERAL_LEN").and_then(|v| v.parse().ok()).unwrap_or(6),
            retention_interval: Duration::from_secs(
                get("RETENTION_INTERVAL_SEC").and_then(|v| v.parse().ok()).unwrap_or(3600),
            ),
            artifacts_ttl: Duration::from_secs(
                get("ARTIFACTS_TTL_SEC").and_then(|v| v.parse().ok()).unwrap_or(7 * 24 * 3600),
            ),
            workspaces_ttl: Duration::from_secs(
                get("WORKSPACES_TTL_SEC").and_then(|v| v.parse().ok()).unwrap_or(24 * 3600),
            ),
            project_aliases: env_map_eq_from(&get, "PROJECT_ALIASES"),
            allow_absolute_workdir: get("ALLOW_ABSOLUTE_WORKDIR")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(false),
            non_git_workdir_status: match get("NON_GIT_WORKDIR_STATUS").as_deref() {
                Some("failed") => NonGitWorkdirStatus::Failed,
                _ => NonGitWorkdirStatus::NeedsHuman,
            },
            budget_db_path: get("BUDGET_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("budget.sqlite3")),
            max_daily_api_calls: get("MAX_DAILY_API_CALLS").and_then(|v| v.parse().ok()).unwrap_or(1000),
            max_daily_cost_usd: get("MAX_DAILY_COST_USD").and_then(|v| v.parse().ok()).unwrap_or(50.0),
            scheduler_tick_interval: Duration::from_secs(
                get("SCHEDULER_TICK_INTERVAL_SEC").and_then(|v| v.parse().ok()).unwrap_or(30),
            ),
            scheduler_state_path: get("SCHEDULER_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| state_dir.join("scheduler_state.json")),
            scheduler_config_path: get("SCHEDULER_CONFIG_PATH").map(PathBuf::from),
            shutdown_grace: Duration::from_secs(
                get("SHUTDOWN_GRACE_SEC").and_then(|v| v.parse().ok()).unwrap_or(10),
            ),
        }
    }
}

fn env_map_eq_from(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> BTreeMap<String, PathBuf> {
    get(key)
        .map(|v| {
            v.split(',')
                .filter_map(|entry| {
                    let (k, v) = entry.split_once('=')?;
                    Some((k.trim().to_string(), PathBuf::from(v.trim())))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn env_min_versions_from(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> BTreeMap<String, (String, String)> {
    get(key)
        .map(|v| {
            v.split(',')
                .filter_map(|entry| {
                    let (bin, rest) = entry.split_once('=')?;
                    let (ver, cmd) =
                        rest.split_once(':').map(|(v, c)| (v, c)).unwrap_or((rest, "--version"));
                    Some((bin.trim().to_string(), (ver.trim().to_string(), cmd.trim().to_string())))
                })
                .collect()
        })
        .unwrap_or_default()
}
