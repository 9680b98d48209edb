// SPDX-License-Identifier: MIT

//! Output contracts: [`StepResult`], [`JobResult`], and the durable
//! [`JobState`] rewritten after every step.

use crate::ids::StepId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    NeedsHuman,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    Failed,
    NeedsHuman,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), details: None }
    }

    pub fn from_oj_error(err: &crate::OjError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(default = "step_kind")]
    pub kind: String,
    pub step_id: StepId,
    pub agent: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: String,
    pub ended_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Relative paths (from `artifacts/<job_id>/`) of files written.
    pub artifacts: Vec<String>,
}

fn step_kind() -> String {
    "step".into()
}

impl StepResult {
    /// The four files every completed step is required to have
    /// produced, regardless of outcome.
    pub fn required_artifacts(step_id: &StepId) -> [String; 4] {
        [
            format!("steps/{step_id}/report.md"),
            format!("steps/{step_id}/patch.diff"),
            format!("steps/{step_id}/logs.txt"),
            format!("steps/{step_id}/result.json"),
        ]
    }

    pub fn has_required_artifacts(&self, step_id: &StepId) -> bool {
        Self::required_artifacts(step_id).iter().all(|p| self.artifacts.iter().any(|a| a == p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default = "job_kind")]
    pub kind: String,
    pub job_id: crate::JobId,
    pub status: JobStatus,
    pub steps: Vec<StepResult>,
    pub started_at: String,
    pub ended_at: String,
    /// The first fatal error the job hit, whether that happened before any
    /// step ran (workspace resolution, etc.) or inside a step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

fn job_kind() -> String {
    "job".into()
}

/// Per-step durable record inside `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
    pub last_updated: String,
}

/// `state.json` — rewritten atomically after each step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    pub steps: BTreeMap<String, StepRecord>,
    pub revision: u64,
    /// Total step transitions executed so far, including `goto`.
    #[serde(default)]
    pub transitions: u32,
    /// Index of the step the cursor currently points at.
    #[serde(default)]
    pub cursor: usize,
    /// Set once any step has escalated via `on_failure: continue`. Carried
    /// across claims so a job that resumes after `ask_human` still reports
    /// `failed` overall even if every remaining step then succeeds.
    #[serde(default)]
    pub continue_failed: bool,
}

impl JobState {
    pub fn record_step(&mut self, step_id: &StepId, record: StepRecord) {
        self.steps.insert(step_id.to_string(), record);
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StepId;

    #[test]
    fn required_artifacts_are_step_scoped() {
        let id = StepId::parse("01_plan").unwrap();
        let files = StepResult::required_artifacts(&id);
        assert_eq!(files[0], "steps/01_plan/report.md");
        assert_eq!(files[3], "steps/01_plan/result.json");
    }

    #[test]
    fn has_required_artifacts_detects_missing_file() {
        let id = StepId::parse("01_plan").unwrap();
        let result = StepResult {
            kind: "step".into(),
            step_id: id.clone(),
            agent: "opencode".into(),
            status: StepStatus::Ok,
            attempts: 1,
            started_at: "2026-07-26T00:00:00Z".into(),
            ended_at: "2026-07-26T00:00:01Z".into(),
            error: None,
            artifacts: vec!["steps/01_plan/report.md".into()],
        };
        assert!(!result.has_required_artifacts(&id));
    }

    #[test]
    fn state_revision_increments_on_record() {
        let mut state = JobState::default();
        let id = StepId::parse("a").unwrap();
        state.record_step(
            &id,
            StepRecord {
                status: StepStatus::Ok,
                attempts: 1,
                last_error: None,
                last_updated: "now".into(),
            },
        );
        assert_eq!(state.revision, 1);
        assert_eq!(state.steps.len(), 1);
    }
}
