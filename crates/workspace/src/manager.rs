// SPDX-License-Identifier: MIT

//! Per-job workspace materialization and escape prevention.

use oj_core::config::NonGitWorkdirStatus;
use oj_core::{Config, OjError, WorkDir};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonGitWorkdir {
    NeedsHuman,
    Failed,
}

pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn work_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id).join("work")
    }

    /// Resolves a `WorkDir` to an absolute source path, applying
    /// `project_aliases` or the `allow_absolute_workdir` escape hatch.
    pub fn resolve_source(&self, workdir: &WorkDir, config: &Config) -> Result<PathBuf, OjError> {
        match workdir {
            WorkDir::ProjectId(id) => config
                .project_aliases
                .get(id)
                .cloned()
                .ok_or_else(|| OjError::Validation(format!("unknown project_id {id:?}"))),
            WorkDir::AbsolutePath(path) => {
                if !config.allow_absolute_workdir {
                    return Err(OjError::PolicyViolation(
                        "absolute workdir paths are disabled by config".to_string(),
                    ));
                }
                Ok(path.clone())
            }
        }
    }

    /// Materializes `source` into `WORKSPACES_ROOT/<job_id>/work/`: a git
    /// worktree when `source` is a git repository, or `Err` carrying the
    /// configured `NonGitWorkdirStatus` otherwise so the runner can route
    /// the job to `failed` or `awaiting_approval` per config.
    pub fn materialize(
        &self,
        job_id: &str,
        source: &Path,
        config: &Config,
    ) -> Result<PathBuf, MaterializeError> {
        if !source.is_dir() {
            return Err(MaterializeError::SourceMissing(source.to_path_buf()));
        }
        let dest = self.work_dir(job_id);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(MaterializeError::Io)?;
        }
        self.verify_inside_root(&dest)?;

        // A job re-claimed after parking (e.g. `ask_human` resumed by
        // `approve`) already has its worktree from the first claim; `git
        // worktree add` would refuse to reuse the directory, so treat an
        // existing workspace as already materialized.
        if dest.is_dir() {
            return Ok(dest);
        }

        if source.join(".git").exists() {
            let status = Command::new("git")
                .args(["worktree", "add", "--detach"])
                .arg(&dest)
                .arg("HEAD")
                .current_dir(source)
                .status()
                .map_err(MaterializeError::Io)?;
            if !status.success() {
                return Err(MaterializeError::GitWorktreeFailed);
            }
            Ok(dest)
        } else {
            let non_git = match config.non_git_workdir_status {
                NonGitWorkdirStatus::NeedsHuman => NonGitWorkdir::NeedsHuman,
                NonGitWorkdirStatus::Failed => NonGitWorkdir::Failed,
            };
            Err(MaterializeError::NonGitWorkdir(non_git))
        }
    }

    /// Escape prevention: the fully canonicalized workspace
    /// path must equal or descend from the canonicalized
    /// `WORKSPACES_ROOT`, including through any symlink in the ancestry.
    fn verify_inside_root(&self, dest: &Path) -> Result<(), MaterializeError> {
        let canon_root = self.root.canonicalize().map_err(MaterializeError::Io)?;
        // `dest` (and its parent `<job_id>/`) may not exist as a concrete
        // directory yet; canonicalize the deepest existing ancestor and
        // rebuild the remaining (not-yet-created) suffix on top of it.
        let mut existing = dest.to_path_buf();
        let mut suffix = Vec::new();
        while !existing.exists() {
            suffix.push(existing.file_name().map(|n| n.to_os_string()).unwrap_or_default());
            if !existing.pop() {
                break;
            }
        }
        let canon_existing = existing.canonicalize().map_err(MaterializeError::Io)?;
        let mut rebuilt = canon_existing;
        for part in suffix.into_iter().rev() {
            rebuilt.push(part);
        }
        if rebuilt == canon_root || rebuilt.starts_with(&canon_root) {
            Ok(())
        } else {
            Err(MaterializeError::Escape(rebuilt))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("workdir source {0:?} does not exist")]
    SourceMissing(PathBuf),
    #[error("git worktree add failed")]
    GitWorktreeFailed,
    #[error("workdir is not a git repository")]
    NonGitWorkdir(NonGitWorkdir),
    #[error("workspace path {0:?} escapes WORKSPACES_ROOT")]
    Escape(PathBuf),
    #[error(transparent)]
    Io(std::io::Error),
}

impl From<MaterializeError> for OjError {
    fn from(e: MaterializeError) -> Self {
        match e {
            MaterializeError::Escape(p) => OjError::PathTraversal(p.display().to_string()),
            MaterializeError::NonGitWorkdir(_) => {
                OjError::PolicyViolation("non-git workdir".to_string())
            }
            other => OjError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
