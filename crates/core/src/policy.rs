// SPDX-License-Identifier: MIT

//! [`ExecutionPolicy`] — the effective set of guards applied to each
//! subprocess spawn. `PolicyOverride` is the partial form
//! carried on a `JobSpec`; `ExecutionPolicy::merge` overlays it on the
//! config-wide defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    Allow,
    Deny,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        NetworkPolicy::Deny
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_wrapper: Option<String>,
    #[serde(default)]
    pub sandbox_wrapper_args: Vec<String>,
    #[serde(default)]
    pub network_policy: NetworkPolicy,
    #[serde(default)]
    pub allowed_binaries: BTreeSet<String>,
    #[serde(default)]
    pub env_allowlist: BTreeSet<String>,
    #[serde(default)]
    pub sensitive_env_vars: BTreeSet<String>,
    #[serde(default)]
    pub sandbox_clear_env: bool,
    #[serde(default = "default_max_files")]
    pub max_input_artifacts_files: usize,
    #[serde(default = "default_max_chars")]
    pub max_input_artifact_chars: usize,
    #[serde(default = "default_max_chars_total")]
    pub max_input_artifacts_chars_total: usize,
}

fn default_max_files() -> usize {
    20
}
fn default_max_chars() -> usize {
    200_000
}
fn default_max_chars_total() -> usize {
    1_000_000
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            sandbox: false,
            sandbox_wrapper: None,
            sandbox_wrapper_args: Vec::new(),
            network_policy: NetworkPolicy::Deny,
            allowed_binaries: BTreeSet::new(),
            env_allowlist: BTreeSet::new(),
            sensitive_env_vars: BTreeSet::new(),
            sandbox_clear_env: false,
            max_input_artifacts_files: default_max_files(),
            max_input_artifact_chars: default_max_chars(),
            max_input_artifacts_chars_total: default_max_chars_total(),
        }
    }
}

/// Partial policy overrides a `JobSpec` may carry. `None` fields inherit the
/// config-wide default; `Some` fields replace it wholesale (no per-field
/// merging inside `allowed_binaries` etc — a job either trusts the default
/// set or states its own).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_wrapper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_wrapper_args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_binaries: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_allowlist: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_env_vars: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_clear_env: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_artifacts_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_artifact_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_artifacts_chars_total: Option<usize>,
}

impl ExecutionPolicy {
    pub fn merge(defaults: &ExecutionPolicy, over: Option<&PolicyOverride>) -> ExecutionPolicy {
        let Some(o) = over else { return defaults.clone() };
        ExecutionPolicy {
            sandbox: o.sandbox.unwrap_or(defaults.sandbox),
            sandbox_wrapper: o.sandbox_wrapper.clone().or_else(|| defaults.sandbox_wrapper.clone()),
            sandbox_wrapper_args: o
                .sandbox_wrapper_args
                .clone()
                .unwrap_or_else(|| defaults.sandbox_wrapper_args.clone()),
            network_policy: o.network_policy.unwrap_or(defaults.network_policy),
            allowed_binaries: o.allowed_binaries.clone().unwrap_or_else(|| defaults.allowed_binaries.clone()),
            env_allowlist: o.env_allowlist.clone().unwrap_or_else(|| defaults.env_allowlist.clone()),
            sensitive_env_vars: o
                .sensitive_env_vars
                .clone()
                .unwrap_or_else(|| defaults.sensitive_env_vars.clone()),
            sandbox_clear_env: o.sandbox_clear_env.unwrap_or(defaults.sandbox_clear_env),
            max_input_artifacts_files: o
                .max_input_artifacts_files
                .unwrap_or(defaults.max_input_artifacts_files),
            max_input_artifact_chars: o
                .max_input_artifact_chars
                .unwrap_or(defaults.max_input_artifact_chars),
            max_input_artifacts_chars_total: o
                .max_input_artifacts_chars_total
                .unwrap_or(defaults.max_input_artifacts_chars_total),
        }
    }
}
