// SPDX-License-Identifier: MIT

//! Builders shared by this crate's tests and by downstream crates' tests,
//! gated behind the `test-support` feature so they never ship in release
//! builds.

use crate::ids::{JobId, StepId};
use crate::job_spec::{JobSpec, OnFailure, StepSpec, WorkDir};
use std::collections::BTreeMap;

pub fn step(step_id: &str, agent: &str) -> StepSpec {
    StepSpec {
        step_id: StepId::parse(step_id).expect("valid step id in test fixture"),
        agent: agent.to_string(),
        role: String::new(),
        prompt: String::new(),
        input_artifacts: Vec::new(),
        allowed_tools: None,
        timeout_sec: None,
        max_attempts: None,
        on_failure: OnFailure::Stop,
    }
}

pub fn job_spec(job_id: &str, steps: Vec<StepSpec>) -> JobSpec {
    JobSpec {
        job_id: JobId::parse(job_id).expect("valid job id in test fixture"),
        goal: "test job".to_string(),
        workdir: WorkDir::ProjectId("demo".to_string()),
        steps,
        policy: None,
        context_window: None,
        context_strategy: None,
        schedule: None,
        labels: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_valid_job() {
        let spec = job_spec("j1", vec![step("01_plan", "opencode"), step("02_impl", "codex")]);
        assert!(spec.validate().is_ok());
    }
}
