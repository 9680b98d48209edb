// SPDX-License-Identifier: MIT

//! The cron scheduler: reads a configured set of named cron entries,
//! tracks each entry's next fire time in a durable `scheduler_state.json`
//! (rewritten atomically every tick), and synthesizes jobs from a template
//! `JobSpec` when an entry's time arrives.

use chrono::{DateTime, Utc};
use cron::Schedule;
use oj_core::{JobId, JobSpec, OjError};
use oj_storage::Queue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One named cron entry: a schedule expression and the job to stamp out
/// whenever it fires. `template.job_id` is overwritten with the
/// synthesized id on every tick, so whatever the config file carries there
/// is ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub cron_expr: String,
    pub template: JobSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SchedulerState {
    next_fire: BTreeMap<String, DateTime<Utc>>,
}

pub struct CronScheduler {
    entries: Vec<ScheduleEntry>,
    state_path: PathBuf,
    state: SchedulerState,
}

impl CronScheduler {
    /// Loads persisted state from `state_path` if present, then
    /// initializes any entry missing from it to its next fire time
    /// strictly after `now` — never back-filling time that elapsed while
    /// the scheduler was down.
    pub fn load(entries: Vec<ScheduleEntry>, state_path: impl Into<PathBuf>, now: DateTime<Utc>) -> Result<Self, OjError> {
        let state_path = state_path.into();
        let mut state = if state_path.exists() {
            let bytes = std::fs::read(&state_path)?;
            serde_json::from_slice(&bytes).unwrap_or_default()
        } else {
            SchedulerState::default()
        };

        for entry in &entries {
            if !state.next_fire.contains_key(&entry.name) {
                let schedule = parse_schedule(&entry.cron_expr)?;
                let next = schedule
                    .after(&now)
                    .next()
                    .ok_or_else(|| OjError::Validation(format!("cron expression {:?} never fires", entry.cron_expr)))?;
                state.next_fire.insert(entry.name.clone(), next);
            }
        }

        let mut scheduler = Self { entries, state_path, state };
        scheduler.persist()?;
        Ok(scheduler)
    }

    /// Enqueues every entry whose `next_fire_time <= now`, advancing each
    /// fired entry to its next boundary strictly after `now`. Returns the
    /// names of entries that fired this tick.
    pub fn tick(&mut self, queue: &Queue, now: DateTime<Utc>) -> Result<Vec<String>, OjError> {
        let mut fired = Vec::new();
        for entry in self.entries.clone() {
            let due = self.state.next_fire.get(&entry.name).copied().unwrap_or(now);
            if due > now {
                continue;
            }

            let job_id = synthesize_job_id(&entry.name, now);
            let mut spec = entry.template.clone();
            spec.job_id = job_id;
            spec.schedule = Some(entry.cron_expr.clone());

            match queue.enqueue(&spec) {
                Ok(_) => fired.push(entry.name.clone()),
                Err(OjError::DuplicateJob(_)) => fired.push(entry.name.clone()),
                Err(other) => return Err(other),
            }

            let schedule = parse_schedule(&entry.cron_expr)?;
            let next = schedule
                .after(&now)
                .next()
                .ok_or_else(|| OjError::Validation(format!("cron expression {:?} never fires", entry.cron_expr)))?;
            self.state.next_fire.insert(entry.name.clone(), next);
        }
        if !fired.is_empty() {
            self.persist()?;
        }
        Ok(fired)
    }

    fn persist(&self) -> Result<(), OjError> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        let tmp = self.state_path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        self.state.next_fire.get(name).copied()
    }
}

fn parse_schedule(expr: &str) -> Result<Schedule, OjError> {
    Schedule::from_str(expr).map_err(|e| OjError::Validation(format!("invalid cron expression {expr:?}: {e}")))
}

fn synthesize_job_id(name: &str, now: DateTime<Utc>) -> JobId {
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    JobId::parse(format!("{name}-{stamp}")).unwrap_or_else(|_| {
        #[allow(clippy::expect_used)]
        JobId::parse(format!("job-{stamp}")).expect("a timestamp-only fallback id is always valid")
    })
}

pub fn load_entries_from_file(path: &Path) -> Result<Vec<ScheduleEntry>, OjError> {
    let bytes = std::fs::read(path)?;
    let entries: Vec<ScheduleEntry> = serde_json::from_slice(&bytes)?;
    Ok(entries)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
