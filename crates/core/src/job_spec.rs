// SPDX-License-Identifier: MIT

//! The enqueue-time input contract: [`JobSpec`] and [`StepSpec`].

use crate::ids::{JobId, StepId};
use crate::policy::PolicyOverride;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a step is to continue past an exhausted retry budget. The wire form
/// is always a single string: `"stop"`, `"continue"`, `"ask_human"`, or
/// `"goto:<step_id>"` — serde's enum tagging can't express that shape, so
/// `OnFailure` implements `Serialize`/`Deserialize` by hand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OnFailure {
    #[default]
    Stop,
    Continue,
    AskHuman,
    Goto(StepId),
}

impl Serialize for OnFailure {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            OnFailure::Stop => s.serialize_str("stop"),
            OnFailure::Continue => s.serialize_str("continue"),
            OnFailure::AskHuman => s.serialize_str("ask_human"),
            OnFailure::Goto(id) => s.serialize_str(&format!("goto:{id}")),
        }
    }
}

impl<'de> Deserialize<'de> for OnFailure {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.as_str() {
            "stop" => Ok(OnFailure::Stop),
            "continue" => Ok(OnFailure::Continue),
            "ask_human" => Ok(OnFailure::AskHuman),
            other => {
                let target = other
                    .strip_prefix("goto:")
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid on_failure: {other:?}")))?;
                let step_id = StepId::parse(target).map_err(serde::de::Error::custom)?;
                Ok(OnFailure::Goto(step_id))
            }
        }
    }
}

/// Identifies the source repository a job operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkDir {
    ProjectId(String),
    /// Only honored when config permits the absolute-path escape hatch.
    AbsolutePath(std::path::PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub step_id: StepId,
    pub agent: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub input_artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub job_id: JobId,
    pub goal: String,
    pub workdir: WorkDir,
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_strategy: Option<String>,
    /// Only set by the scheduler when it synthesizes a job from a cron entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Free-form operator tags, carried for CLI filtering only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobSpecError {
    #[error("job has no steps")]
    NoSteps,
    #[error("duplicate step_id {0:?}")]
    DuplicateStepId(String),
    #[error("step {0:?} has goto target {1:?} which is not a defined step_id")]
    UnknownGotoTarget(String, String),
}

impl JobSpec {
    /// Validates the invariants that aren't expressible purely in the type
    /// system: non-empty steps, unique step ids, and `goto` targets that
    /// resolve to a real step.
    pub fn validate(&self) -> Result<(), JobSpecError> {
        if self.steps.is_empty() {
            return Err(JobSpecError::NoSteps);
        }
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_id.as_str()) {
                return Err(JobSpecError::DuplicateStepId(step.step_id.to_string()));
            }
        }
        for step in &self.steps {
            if let OnFailure::Goto(target) = &step.on_failure {
                if !self.steps.iter().any(|s| &s.step_id == target) {
                    return Err(JobSpecError::UnknownGotoTarget(
                        step.step_id.to_string(),
                        target.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn step(&self, id: &StepId) -> Option<&StepSpec> {
        self.steps.iter().find(|s| &s.step_id == id)
    }

    pub fn step_index(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.step_id == id)
    }
}

#[cfg(test)]
#[path = "job_spec_tests.rs"]
mod tests;
