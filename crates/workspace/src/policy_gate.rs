// SPDX-License-Identifier: MIT

//! Policy enforcement run immediately before every subprocess spawn.
//! All four conditions are checked independently; any one
//! failing refuses the spawn.

use oj_core::ExecutionPolicy;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("ENABLE_REAL_CLI requires sandbox_wrapper when sandbox=true")]
    SandboxWrapperRequired,
    #[error("binary {0:?} is not in allowed_binaries")]
    BinaryNotAllowed(String),
    #[error("network_policy=deny requires a sandbox wrapper")]
    NetworkDenyRequiresWrapper,
    #[error("preflight version check failed for {binary:?}: found {found:?}, need >= {need:?}")]
    VersionTooOld { binary: String, found: String, need: String },
    #[error("preflight version check could not run {binary:?}: {detail}")]
    VersionCheckFailed { binary: String, detail: String },
}

fn basename(binary: &str) -> &str {
    Path::new(binary).file_name().and_then(|n| n.to_str()).unwrap_or(binary)
}

/// Runs the four static preflight checks. `enable_real_cli` mirrors the
/// `ENABLE_REAL_CLI` env var; callers that are still in simulation mode
/// should not call this at all (simulation workers never spawn binaries).
pub fn preflight(
    binary: &str,
    enable_real_cli: bool,
    policy: &ExecutionPolicy,
    min_versions: &BTreeMap<String, (String, String)>,
) -> Result<(), PreflightError> {
    if enable_real_cli && policy.sandbox && policy.sandbox_wrapper.is_none() {
        return Err(PreflightError::SandboxWrapperRequired);
    }

    let base = basename(binary);
    if !policy.allowed_binaries.contains(base) {
        return Err(PreflightError::BinaryNotAllowed(base.to_string()));
    }

    if matches!(policy.network_policy, oj_core::policy::NetworkPolicy::Deny)
        && policy.sandbox_wrapper.is_none()
    {
        return Err(PreflightError::NetworkDenyRequiresWrapper);
    }

    if let Some((min_version, version_cmd)) = min_versions.get(base) {
        check_min_version(base, min_version, version_cmd)?;
    }

    Ok(())
}

fn check_min_version(binary: &str, min_version: &str, version_cmd: &str) -> Result<(), PreflightError> {
    let output = Command::new(binary).arg(version_cmd).output().map_err(|e| {
        PreflightError::VersionCheckFailed { binary: binary.to_string(), detail: e.to_string() }
    })?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let found = extract_version(&text).ok_or_else(|| PreflightError::VersionCheckFailed {
        binary: binary.to_string(),
        detail: "no version-like token in output".to_string(),
    })?;
    if compare_versions(&found, min_version) >= std::cmp::Ordering::Equal {
        Ok(())
    } else {
        Err(PreflightError::VersionTooOld {
            binary: binary.to_string(),
            found,
            need: min_version.to_string(),
        })
    }
}

fn extract_version(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|tok| tok.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
        .map(|tok| tok.trim_start_matches('v').to_string())
}

fn parse_version_parts(v: &str) -> Vec<u64> {
    v.split('.').map(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect::<String>()).map(|p| p.parse().unwrap_or(0)).collect()
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let pa = parse_version_parts(a);
    let pb = parse_version_parts(b);
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).copied().unwrap_or(0);
        let y = pb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}
