// SPDX-License-Identifier: MIT

//! Child-process environment hygiene: filter the parent
//! environment down to the allowlist, then optionally scrub further under
//! `sandbox_clear_env`.

use oj_core::ExecutionPolicy;
use std::collections::BTreeMap;

/// Builds the environment a spawned subprocess should receive: allowlisted
/// parent vars, or nothing at all when `sandbox_clear_env` is set (the
/// sandbox wrapper is then solely responsible for whatever environment the
/// child sees).
pub fn build_child_env(
    parent_env: &BTreeMap<String, String>,
    policy: &ExecutionPolicy,
) -> BTreeMap<String, String> {
    if policy.sandbox_clear_env {
        return BTreeMap::new();
    }
    parent_env
        .iter()
        .filter(|(k, _)| policy.env_allowlist.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
