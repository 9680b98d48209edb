// SPDX-License-Identifier: MIT

//! The filesystem queue: a job is a single JSON file whose stem
//! is `job_id`, living in one of five sibling directories under
//! `QUEUE_ROOT`. All state transitions are atomic same-directory or
//! cross-directory `rename`s — never an in-place edit.

use oj_core::{JobId, JobSpec, OjError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDir {
    Pending,
    Running,
    Done,
    Failed,
    AwaitingApproval,
}

impl QueueDir {
    pub const ALL: [QueueDir; 5] =
        [QueueDir::Pending, QueueDir::Running, QueueDir::Done, QueueDir::Failed, QueueDir::AwaitingApproval];

    fn dirname(self) -> &'static str {
        match self {
            QueueDir::Pending => "pending",
            QueueDir::Running => "running",
            QueueDir::Done => "done",
            QueueDir::Failed => "failed",
            QueueDir::AwaitingApproval => "awaiting_approval",
        }
    }
}

impl std::fmt::Display for QueueDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dirname())
    }
}

/// Outcome a job's queue file is moved to on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Done,
    Failed,
    AwaitingApproval,
}

impl From<Terminal> for QueueDir {
    fn from(t: Terminal) -> Self {
        match t {
            Terminal::Done => QueueDir::Done,
            Terminal::Failed => QueueDir::Failed,
            Terminal::AwaitingApproval => QueueDir::AwaitingApproval,
        }
    }
}

pub struct Queue {
    root: PathBuf,
}

impl Queue {
    /// Opens the queue rooted at `root`, creating the five sibling state
    /// directories if they don't exist yet. `root` must live on one
    /// filesystem — this is a caller responsibility, not checked here.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, OjError> {
        let root = root.into();
        for dir in QueueDir::ALL {
            fs::create_dir_all(root.join(dir.dirname()))?;
        }
        Ok(Self { root })
    }

    fn dir_path(&self, dir: QueueDir) -> PathBuf {
        self.root.join(dir.dirname())
    }

    /// Returns every file in `dir` whose job id matches, either exactly
    /// (`<job_id>.json`) or with a disambiguating numeric suffix
    /// (`<job_id>.<n>.json`). Uses a literal-dot separator so `job-1` never
    /// matches `job-12.json`.
    pub fn find_job_files(dir: &Path, job_id: &str) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        let exact = dir.join(format!("{job_id}.json"));
        let prefix = format!("{job_id}.");
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if path == exact {
                out.push(path);
                continue;
            }
            if let Some(rest) = name.strip_prefix(&prefix) {
                // rest must be "<disambiguator>.json" — the disambiguator
                // itself must not contain '.', guaranteeing `job-1.` never
                // matches a file actually named for `job-12`.
                if let Some(disambiguator) = rest.strip_suffix(".json") {
                    if !disambiguator.is_empty() && !disambiguator.contains('.') {
                        out.push(path);
                    }
                }
            }
        }
        Ok(out)
    }

    fn exists_anywhere(&self, job_id: &str) -> io::Result<bool> {
        for dir in QueueDir::ALL {
            if !Self::find_job_files(&self.dir_path(dir), job_id)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Atomically writes `spec` into `pending/`. Fails with
    /// `OjError::DuplicateJob` if a file for this `job_id` exists in *any*
    /// of the five directories, including `done/`.
    pub fn enqueue(&self, spec: &JobSpec) -> Result<JobId, OjError> {
        let job_id = spec.job_id.to_string();
        if self.exists_anywhere(&job_id)? {
            return Err(OjError::DuplicateJob(job_id));
        }
        let pending = self.dir_path(QueueDir::Pending);
        let final_path = pending.join(format!("{job_id}.json"));
        let tmp_path = pending.join(format!("{job_id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(spec)?;
        write_atomic(&tmp_path, &final_path, &bytes)?;
        Ok(spec.job_id.clone())
    }

    /// Scans `pending/` in ascending modification-time order and attempts
    /// to claim the first candidate by renaming it into `running/`. A
    /// losing race (another runner claimed it first) is not an error — the
    /// caller moves on to the next candidate.
    pub fn claim(&self) -> Result<(JobId, JobSpec, PathBuf), OjError> {
        let pending = self.dir_path(QueueDir::Pending);
        let running = self.dir_path(QueueDir::Running);
        let mut candidates = read_dir_sorted_by_mtime(&pending)?;
        candidates.retain(|p| p.extension().map(|e| e == "json").unwrap_or(false));

        for candidate in candidates {
            let Some(name) = candidate.file_name() else { continue };
            let target = running.join(name);
            match fs::rename(&candidate, &target) {
                Ok(()) => {
                    let bytes = fs::read(&target)?;
                    let spec: JobSpec = serde_json::from_slice(&bytes)?;
                    return Ok((spec.job_id.clone(), spec, target));
                }
                Err(_) => continue, // raced by another runner; try the next file
            }
        }
        Err(OjError::QueueEmpty)
    }

    /// Moves the job's `running/` file to its terminal directory. Missing
    /// source file raises; calling this twice with the same terminal on an
    /// already-moved job is a no-op (idempotent against repeated success
    /// calls within one runner).
    pub fn complete(&self, job_id: &str, terminal: Terminal) -> Result<(), OjError> {
        let dest_dir: QueueDir = terminal.into();
        let dest = self.dir_path(dest_dir).join(format!("{job_id}.json"));
        if dest.exists() {
            return Ok(());
        }
        let running = self.dir_path(QueueDir::Running);
        let files = Self::find_job_files(&running, job_id)?;
        let Some(src) = files.into_iter().next() else {
            return Err(OjError::Validation(format!(
                "cannot complete job {job_id:?}: no file in running/"
            )));
        };
        fs::rename(&src, &dest)?;
        let _ = fs::remove_file(self.attempts_path(job_id));
        Ok(())
    }

    fn attempts_path(&self, job_id: &str) -> PathBuf {
        self.dir_path(QueueDir::Running).join(format!("{job_id}.attempts"))
    }

    fn read_attempts(&self, job_id: &str) -> u32 {
        fs::read_to_string(self.attempts_path(job_id))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn write_attempts(&self, job_id: &str, count: u32) -> io::Result<()> {
        let path = self.attempts_path(job_id);
        let tmp = path.with_extension("attempts.tmp");
        write_atomic(&tmp, &path, count.to_string().as_bytes())
    }

    /// For each file in `running/` older than `max_age` by mtime, renames
    /// it back to `pending/`, bumping a durable per-job reclaim counter.
    /// Once the counter exceeds `max_reclaim_attempts` the job is moved to
    /// `failed/` with a synthesized `runner_shutdown` error instead.
    pub fn reclaim_stale_running(
        &self,
        max_age: std::time::Duration,
        max_reclaim_attempts: u32,
    ) -> Result<Vec<ReclaimOutcome>, OjError> {
        let running = self.dir_path(QueueDir::Running);
        let mut outcomes = Vec::new();
        if !running.is_dir() {
            return Ok(outcomes);
        }
        for entry in fs::read_dir(&running)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let meta = entry.metadata()?;
            let age = SystemTime::now().duration_since(meta.modified()?).unwrap_or_default();
            if age < max_age {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let job_id = stem.split('.').next().unwrap_or(stem).to_string();
            let attempts = self.read_attempts(&job_id) + 1;
            if attempts > max_reclaim_attempts {
                let dest = self.dir_path(QueueDir::Failed).join(format!("{job_id}.json"));
                fs::rename(&path, &dest)?;
                let _ = fs::remove_file(self.attempts_path(&job_id));
                outcomes.push(ReclaimOutcome::Failed(JobId::parse(job_id).map_err(|e| {
                    OjError::Validation(e.to_string())
                })?));
            } else {
                self.write_attempts(&job_id, attempts)?;
                let dest = self.dir_path(QueueDir::Pending).join(format!("{job_id}.json"));
                fs::rename(&path, &dest)?;
                outcomes.push(ReclaimOutcome::Requeued(
                    JobId::parse(job_id).map_err(|e| OjError::Validation(e.to_string()))?,
                    attempts,
                ));
            }
        }
        Ok(outcomes)
    }

    /// Moves a job from `awaiting_approval/` back to `pending/`, clearing
    /// the human-in-the-loop gate.
    pub fn approve(&self, job_id: &str) -> Result<(), OjError> {
        self.move_between(QueueDir::AwaitingApproval, QueueDir::Pending, job_id)
    }

    /// Moves a job from `running/` back to `pending/` on operator command.
    pub fn unlock(&self, job_id: &str) -> Result<(), OjError> {
        self.move_between(QueueDir::Running, QueueDir::Pending, job_id)
    }

    fn move_between(&self, from: QueueDir, to: QueueDir, job_id: &str) -> Result<(), OjError> {
        let src_dir = self.dir_path(from);
        let files = Self::find_job_files(&src_dir, job_id)?;
        let Some(src) = files.into_iter().next() else {
            return Err(OjError::Validation(format!(
                "job {job_id:?} not found in {}/",
                from.dirname()
            )));
        };
        let dest = self.dir_path(to).join(format!("{job_id}.json"));
        fs::rename(&src, &dest)?;
        Ok(())
    }

    /// Reads a job's spec from whichever directory it currently occupies,
    /// for readers like `oj result`/`oj status` that must tolerate a job
    /// moving between states concurrently.
    pub fn read_spec(&self, job_id: &str) -> Result<Option<JobSpec>, OjError> {
        for dir in QueueDir::ALL {
            let files = Self::find_job_files(&self.dir_path(dir), job_id)?;
            if let Some(path) = files.into_iter().next() {
                let bytes = fs::read(&path)?;
                return Ok(Some(serde_json::from_slice(&bytes)?));
            }
        }
        Ok(None)
    }

    pub fn locate(&self, job_id: &str) -> Result<Option<QueueDir>, OjError> {
        for dir in QueueDir::ALL {
            if !Self::find_job_files(&self.dir_path(dir), job_id)?.is_empty() {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }

    /// Counts `.json` job files in each of the five state directories, for
    /// an operator-facing overview without reading every job spec.
    pub fn counts(&self) -> Result<Vec<(QueueDir, usize)>, OjError> {
        let mut out = Vec::with_capacity(QueueDir::ALL.len());
        for dir in QueueDir::ALL {
            let mut count = 0usize;
            let path = self.dir_path(dir);
            if path.is_dir() {
                for entry in fs::read_dir(&path)? {
                    let entry = entry?;
                    if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                        count += 1;
                    }
                }
            }
            out.push((dir, count));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Requeued(JobId, u32),
    Failed(JobId),
}

fn read_dir_sorted_by_mtime(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        entries.push((meta.modified()?, entry.path()));
    }
    entries.sort_by_key(|(mtime, _)| *mtime);
    Ok(entries.into_iter().map(|(_, p)| p).collect())
}

/// Write-temp-then-rename within the same directory: fsync the temp file
/// before the rename so a crash can't leave a zero-length target.
fn write_atomic(tmp: &Path, dest: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let file = fs::File::create(tmp)?;
        use std::io::Write;
        let mut file = file;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp, dest)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
