// SPDX-License-Identifier: MIT

//! Periodic sweeper that reaps artifact and workspace directories once
//! they age past their configured TTL, skipping any job still sitting in
//! a non-terminal queue state.

use oj_core::OjError;
use oj_storage::{Queue, QueueDir};
use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub artifacts_reaped: Vec<String>,
    pub workspaces_reaped: Vec<String>,
}

/// Removes `artifacts/<job_id>/` directories older than `artifacts_ttl` and
/// `workspaces/<job_id>/` directories older than `workspaces_ttl`, by
/// `max(mtime, atime)`. A job id is never reaped while it sits in
/// `pending/`, `running/`, or `awaiting_approval/`.
pub fn sweep(
    queue: &Queue,
    artifacts_root: &Path,
    workspaces_root: &Path,
    artifacts_ttl: Duration,
    workspaces_ttl: Duration,
) -> Result<SweepReport, OjError> {
    let protected = non_terminal_job_ids(queue, artifacts_root, workspaces_root)?;
    let mut report = SweepReport::default();

    reap_dir(artifacts_root, artifacts_ttl, &protected, &mut report.artifacts_reaped)?;
    reap_dir(workspaces_root, workspaces_ttl, &protected, &mut report.workspaces_reaped)?;

    Ok(report)
}

fn non_terminal_job_ids(
    queue: &Queue,
    artifacts_root: &Path,
    workspaces_root: &Path,
) -> Result<HashSet<String>, OjError> {
    let mut ids = HashSet::new();
    for root in [artifacts_root, workspaces_root] {
        if !root.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let Some(job_id) = entry.file_name().to_str().map(str::to_string) else { continue };
            match queue.locate(&job_id)? {
                Some(QueueDir::Pending) | Some(QueueDir::Running) | Some(QueueDir::AwaitingApproval) => {
                    ids.insert(job_id);
                }
                _ => {}
            }
        }
    }
    Ok(ids)
}

fn reap_dir(root: &Path, ttl: Duration, protected: &HashSet<String>, reaped: &mut Vec<String>) -> Result<(), OjError> {
    if !root.is_dir() {
        return Ok(());
    }
    let now = SystemTime::now();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(job_id) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if protected.contains(job_id) {
            continue;
        }
        let age = dir_age(&path, now)?;
        if age >= ttl {
            std::fs::remove_dir_all(&path)?;
            reaped.push(job_id.to_string());
        }
    }
    Ok(())
}

fn dir_age(path: &Path, now: SystemTime) -> Result<Duration, OjError> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta.modified().unwrap_or(now);
    let atime = meta.accessed().unwrap_or(mtime);
    let newest = mtime.max(atime);
    Ok(now.duration_since(newest).unwrap_or_default())
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
