// SPDX-License-Identifier: MIT

//! `SimulationWorker` — the default worker. It lets the system run
//! end-to-end with no external dependencies. Output is deterministic from
//! `(job_id, step_id, attempt)` so end-to-end scenarios stay reproducible
//! without a real agent binary.

use crate::worker::{StepContext, StepOutcome, Worker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

/// Simulated agent output keyed off `StepSpec.role`. Unrecognized roles
/// fall back to a generic template rather than failing — the point of
/// simulation is to never need an external contract to stay in sync with.
#[derive(Debug, Clone, Default)]
pub struct SimulationWorker {
    /// Per-step, per-attempt artificial delay, consumed in order. Lets
    /// integration tests reproduce a worker that sleeps past its timeout
    /// on the first attempt and succeeds immediately on the second,
    /// without a real agent process.
    scripted_delays: Arc<Mutex<HashMap<String, Vec<Duration>>>>,
}

impl SimulationWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sequence of per-attempt delays for `step_id`. The Nth
    /// `run()` call for that step sleeps for `delays[N-1]`; once the
    /// sequence is exhausted, subsequent attempts return immediately.
    pub fn with_scripted_delays(self, step_id: impl Into<String>, delays: Vec<Duration>) -> Self {
        self.scripted_delays.lock().insert(step_id.into(), delays);
        self
    }

    fn delay_for(&self, step_id: &str, attempt: u32) -> Duration {
        let delays = self.scripted_delays.lock();
        delays
            .get(step_id)
            .and_then(|d| d.get(attempt.saturating_sub(1) as usize))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Worker for SimulationWorker {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let delay = self.delay_for(ctx.step.step_id.as_str(), ctx.attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancel.cancelled() => {
                    return StepOutcome::failed(oj_core::ErrorInfo::new(
                        "timeout",
                        "simulation worker cancelled before completing scripted delay",
                    ));
                }
            }
        }

        let report = render_report(ctx);
        let patch = render_patch(ctx);
        let logs = render_logs(ctx, delay);

        if let Err(e) = write_required_files(ctx, &report, &patch, &logs) {
            return StepOutcome::failed(oj_core::ErrorInfo::new(
                "worker_contract_violation",
                format!("simulation worker failed to write step artifacts: {e}"),
            ));
        }

        StepOutcome::ok()
    }
}

fn render_report(ctx: &StepContext) -> String {
    format!(
        "# Step {step_id} ({role})\n\nAgent: {agent}\nAttempt: {attempt}\nGoal: {goal}\n\nSimulated {role} complete for job {job_id}.\n",
        step_id = ctx.step.step_id,
        role = if ctx.step.role.is_empty() { "worker" } else { ctx.step.role.as_str() },
        agent = ctx.step.agent,
        attempt = ctx.attempt,
        goal = ctx.job.goal,
        job_id = ctx.job.job_id,
    )
}

fn render_patch(ctx: &StepContext) -> String {
    format!(
        "diff --git a/SIMULATED.md b/SIMULATED.md\n--- /dev/null\n+++ b/SIMULATED.md\n@@ -0,0 +1,1 @@\n+simulated output for step {}\n",
        ctx.step.step_id
    )
}

fn render_logs(ctx: &StepContext, delay: Duration) -> String {
    let mut out = format!(
        "[simulation] job={} step={} attempt={} agent={}\n",
        ctx.job.job_id, ctx.step.step_id, ctx.attempt, ctx.step.agent
    );
    if !delay.is_zero() {
        out.push_str(&format!("[simulation] scripted delay {:?}\n", delay));
    }
    out.push_str(&ctx.redactor.redact(&format!("prompt: {}\n", ctx.step.prompt)));
    out
}

fn write_required_files(ctx: &StepContext, report: &str, patch: &str, logs: &str) -> std::io::Result<()> {
    fs::create_dir_all(&ctx.step_dir)?;
    fs::write(ctx.step_dir.join("report.md"), report)?;
    fs::write(ctx.step_dir.join("patch.diff"), patch)?;
    fs::write(ctx.step_dir.join("logs.txt"), logs)?;
    Ok(())
}

#[cfg(test)]
#[path = "simulation_tests.rs"]
mod tests;
