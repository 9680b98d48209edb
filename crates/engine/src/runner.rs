// SPDX-License-Identifier: MIT

//! The main cooperative runner loop: claim one job, walk its steps to a
//! terminal state, aggregate results, and hand the queue file to its
//! terminal directory.

use crate::budget::BudgetGate;
use crate::cursor::{CursorError, Move, StepCursor};
use crate::input_materializer::materialize_inputs;
use oj_adapters::{StepContext, StepOutcome, WorkerRegistry};
use oj_core::{
    Clock, Config, ErrorInfo, ExecutionPolicy, JobId, JobResult, JobSpec, JobState, JobStatus, OjError, OnFailure,
    Redactor, StepId, StepRecord, StepResult, StepStatus,
};
use oj_storage::{ArtifactStore, Queue, Terminal};
use oj_workspace::WorkspaceManager;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wire codes the runner will retry automatically. `subprocess_exit_nonzero`
/// is deliberately excluded: the wire contract carries no worker-asserted
/// "retriable" bit distinct from the code itself, so a nonzero exit always
/// escalates straight to `on_failure` rather than silently re-running.
fn code_is_retriable(code: &str) -> bool {
    matches!(code, "timeout" | "transient_io")
}

/// Moves the cursor past the step that just parked the job for approval, so
/// that `approve` resumes at the next step rather than re-asking forever.
/// The transition budget is exhausted so rarely in practice that leaving the
/// cursor in place and surfacing a warning is preferable to failing the job
/// on what is meant to be a recoverable pause.
fn advance_past_step(job_id: &JobId, cursor: &mut StepCursor<'_>) {
    if let Err(CursorError::TransitionLimitExceeded(n)) = cursor.apply(Move::Next) {
        warn!(job_id = %job_id, "transition limit ({n}) reached while parking for approval");
    }
}

pub struct Runner<C: Clock> {
    pub queue: Queue,
    pub store: ArtifactStore,
    pub workspace: WorkspaceManager,
    pub registry: WorkerRegistry,
    pub config: Config,
    pub budget: BudgetGate,
    pub clock: C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(Terminal),
    QueueEmpty,
}

impl<C: Clock> Runner<C> {
    /// Claims one pending job (if any) and drives it to a terminal state.
    pub async fn run_one(&mut self) -> Result<JobOutcome, OjError> {
        let (job_id, job, _path) = match self.queue.claim() {
            Ok(claimed) => claimed,
            Err(OjError::QueueEmpty) => return Ok(JobOutcome::QueueEmpty),
            Err(other) => return Err(other),
        };
        let terminal = self.drive_job(&job_id, &job).await?;
        self.queue.complete(job_id.as_str(), terminal)?;
        Ok(JobOutcome::Completed(terminal))
    }

    async fn drive_job(&mut self, job_id: &JobId, job: &JobSpec) -> Result<Terminal, OjError> {
        let started_at = self.clock.now_utc().to_rfc3339();
        let policy = ExecutionPolicy::merge(&self.config.default_policy, job.policy.as_ref());

        let source = match self.workspace.resolve_source(&job.workdir, &self.config) {
            Ok(source) => source,
            Err(err) => return Ok(self.fail_job_before_steps(job_id, &started_at, ErrorInfo::from_oj_error(&err))),
        };
        let workspace_dir = match self.workspace.materialize(job_id.as_str(), &source, &self.config) {
            Ok(dir) => dir,
            Err(err) => {
                let oj_err: OjError = err.into();
                return Ok(self.fail_job_before_steps(job_id, &started_at, ErrorInfo::from_oj_error(&oj_err)));
            }
        };

        let step_ids: Vec<StepId> = job.steps.iter().map(|s| s.step_id.clone()).collect();
        let mut state = self.load_state(job_id)?;
        let mut cursor = StepCursor::new(&step_ids, state.cursor, state.transitions, self.config.step_transition_limit);
        // Steps already recorded in the restored state (from an earlier
        // claim of this same job, e.g. before it parked for approval) stay
        // part of the job's aggregated report instead of being dropped.
        let mut executed: Vec<StepId> =
            step_ids.iter().filter(|id| state.steps.contains_key(id.as_str())).cloned().collect();
        let mut fatal_error: Option<ErrorInfo> = None;

        let terminal = loop {
            if cursor.is_finished() {
                break Terminal::Done;
            }
            let Some(step_id) = cursor.current().cloned() else {
                break Terminal::Done;
            };
            let Some(step) = job.step(&step_id).cloned() else {
                warn!(job_id = %job_id, step = %step_id, "cursor points at an undefined step");
                break Terminal::Failed;
            };

            let step_dir_rel = format!("steps/{step_id}");
            let max_attempts = step.max_attempts.unwrap_or(self.config.runner_max_attempts_per_step).max(1);
            let timeout = step.timeout_sec.map(Duration::from_secs).unwrap_or(self.config.default_step_timeout);

            if let Err(err) = materialize_inputs(
                &self.store,
                job_id.as_str(),
                &step.input_artifacts,
                &policy,
                &workspace_dir,
            ) {
                let error = ErrorInfo::new("validation_error", err.to_string());
                state.record_step(
                    &step_id,
                    StepRecord { status: StepStatus::Failed, attempts: 0, last_error: Some(error.clone()), last_updated: self.clock.now_utc().to_rfc3339() },
                );
                fatal_error.get_or_insert_with(|| error.clone());
                self.persist_state(job_id, &state, &cursor)?;
                match self.escalate(job, &mut cursor, &step) {
                    Escalation::Stop => break Terminal::Failed,
                    Escalation::AskHuman => {
                        advance_past_step(job_id, &mut cursor);
                        self.persist_state(job_id, &state, &cursor)?;
                        break Terminal::AwaitingApproval;
                    }
                    Escalation::Continued => {
                        state.continue_failed = true;
                        executed.push(step_id.clone());
                        continue;
                    }
                    Escalation::Looped => {
                        self.persist_state(job_id, &state, &cursor)?;
                        continue;
                    }
                }
            }

            let mut attempt = 1u32;
            let (outcome, attempts_used) = loop {
                if let Err(err) = self.budget.check_and_log(&step.agent, 1, 0.0) {
                    break (StepOutcome::failed(ErrorInfo::from_oj_error(&err)), attempt);
                }

                let worker = match self.registry.get(&step.agent) {
                    Ok(w) => w,
                    Err(err) => break (StepOutcome::failed(ErrorInfo::from_oj_error(&err)), attempt),
                };

                let redactor = build_redactor(&self.config, &policy);
                let cancel = CancellationToken::new();
                let ctx = StepContext {
                    job: job.clone(),
                    step: step.clone(),
                    policy: policy.clone(),
                    step_dir: self.store.job_root(job_id.as_str()).join(&step_dir_rel),
                    workspace_dir: workspace_dir.clone(),
                    redactor,
                    attempt,
                    timeout,
                    cancel: cancel.clone(),
                };
                std::fs::create_dir_all(&ctx.step_dir)?;

                let outcome = run_with_timeout(worker.as_ref(), &ctx).await;
                let outcome = self.enforce_contract(job_id, &step_id, outcome);

                let retry_eligible = matches!(&outcome.status, StepStatus::Failed)
                    && outcome.error.as_ref().map(|e| code_is_retriable(&e.code)).unwrap_or(false);

                if retry_eligible && attempt < max_attempts {
                    warn!(job_id = %job_id, step = %step_id, attempt, "step attempt failed, retrying");
                    attempt += 1;
                    continue;
                }
                break (outcome, attempt);
            };

            let now = self.clock.now_utc().to_rfc3339();
            let artifacts = self.collect_step_artifacts(job_id, &step_id)?;
            let step_result = StepResult {
                kind: "step".to_string(),
                step_id: step_id.clone(),
                agent: step.agent.clone(),
                status: outcome.status,
                attempts: attempts_used,
                started_at: now.clone(),
                ended_at: now.clone(),
                error: outcome.error.clone(),
                artifacts,
            };
            self.store.write_json(job_id.as_str(), &format!("{step_dir_rel}/result.json"), &step_result)?;
            state.record_step(
                &step_id,
                StepRecord {
                    status: outcome.status,
                    attempts: attempts_used,
                    last_error: outcome.error.clone(),
                    last_updated: now,
                },
            );
            self.persist_state(job_id, &state, &cursor)?;
            executed.push(step_id.clone());

            match outcome.status {
                StepStatus::Ok | StepStatus::Skipped => {
                    if let Err(CursorError::TransitionLimitExceeded(n)) = cursor.apply(Move::Next) {
                        let error = ErrorInfo::new("step_transition_limit", format!("{n} transitions exceeded"));
                        warn!(job_id = %job_id, "step transition limit exceeded");
                        fatal_error.get_or_insert(error);
                        break Terminal::Failed;
                    }
                }
                StepStatus::NeedsHuman => {
                    advance_past_step(job_id, &mut cursor);
                    self.persist_state(job_id, &state, &cursor)?;
                    break Terminal::AwaitingApproval;
                }
                StepStatus::Failed => {
                    fatal_error.get_or_insert_with(|| {
                        outcome.error.clone().unwrap_or_else(|| ErrorInfo::new("step_failed", format!("step {step_id} failed")))
                    });
                    match self.escalate(job, &mut cursor, &step) {
                        Escalation::Stop => break Terminal::Failed,
                        Escalation::AskHuman => {
                            advance_past_step(job_id, &mut cursor);
                            self.persist_state(job_id, &state, &cursor)?;
                            break Terminal::AwaitingApproval;
                        }
                        Escalation::Continued => state.continue_failed = true,
                        Escalation::Looped => {}
                    }
                }
            }
            self.persist_state(job_id, &state, &cursor)?;
        };

        let job_status = match terminal {
            Terminal::AwaitingApproval => JobStatus::NeedsHuman,
            Terminal::Failed => JobStatus::Failed,
            Terminal::Done => {
                if state.continue_failed {
                    JobStatus::Failed
                } else {
                    JobStatus::Ok
                }
            }
        };
        self.aggregate(job_id, &executed, job_status, &started_at, fatal_error)?;
        info!(job_id = %job_id, status = ?job_status, "job reached terminal state");
        Ok(match job_status {
            JobStatus::Ok => Terminal::Done,
            JobStatus::Failed => Terminal::Failed,
            JobStatus::NeedsHuman => Terminal::AwaitingApproval,
        })
    }

    fn fail_job_before_steps(&mut self, job_id: &JobId, started_at: &str, error: ErrorInfo) -> Terminal {
        let _ = self.aggregate(job_id, &[], JobStatus::Failed, started_at, Some(error));
        Terminal::Failed
    }

    fn load_state(&self, job_id: &JobId) -> Result<JobState, OjError> {
        match self.store.read_bytes(job_id.as_str(), "state.json")? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(JobState::default()),
        }
    }

    fn persist_state(&self, job_id: &JobId, state: &JobState, cursor: &StepCursor<'_>) -> Result<(), OjError> {
        let mut state = state.clone();
        state.cursor = cursor.position();
        state.transitions = cursor.transitions();
        self.store.write_json(job_id.as_str(), "state.json", &state)?;
        Ok(())
    }

    fn collect_step_artifacts(&self, job_id: &JobId, step_id: &StepId) -> Result<Vec<String>, OjError> {
        let mut artifacts = Vec::new();
        for rel in ["report.md", "patch.diff", "logs.txt"] {
            let path = format!("steps/{step_id}/{rel}");
            if self.store.exists(job_id.as_str(), &path)? {
                artifacts.push(path);
            }
        }
        Ok(artifacts)
    }

    /// Overrides `outcome` with `worker_contract_violation` when any of the
    /// three required files are missing, regardless of what the worker
    /// itself reported.
    fn enforce_contract(&self, job_id: &JobId, step_id: &StepId, outcome: StepOutcome) -> StepOutcome {
        let required = ["report.md", "patch.diff", "logs.txt"];
        let missing: Vec<&str> = required
            .iter()
            .filter(|rel| !self.store.exists(job_id.as_str(), &format!("steps/{step_id}/{rel}")).unwrap_or(false))
            .copied()
            .collect();
        if missing.is_empty() {
            outcome
        } else {
            StepOutcome::failed(ErrorInfo::new(
                "worker_contract_violation",
                format!("worker did not write required file(s): {}", missing.join(", ")),
            ))
        }
    }

    fn escalate(&self, job: &JobSpec, cursor: &mut StepCursor<'_>, step: &oj_core::StepSpec) -> Escalation {
        match &step.on_failure {
            OnFailure::Stop => Escalation::Stop,
            OnFailure::Continue => Escalation::Continued,
            OnFailure::AskHuman => Escalation::AskHuman,
            OnFailure::Goto(target) => {
                let Some(index) = job.step_index(target) else {
                    warn!(step = %step.step_id, target = %target, "goto target not found, stopping job");
                    return Escalation::Stop;
                };
                match cursor.apply(Move::Goto(index)) {
                    Ok(()) => Escalation::Looped,
                    Err(CursorError::TransitionLimitExceeded(_)) => {
                        warn!(job_id = %job.job_id, "transition budget exhausted during goto escalation");
                        Escalation::Stop
                    }
                    Err(CursorError::IndexOutOfRange(_)) => Escalation::Stop,
                }
            }
        }
    }

    fn aggregate(
        &self,
        job_id: &JobId,
        executed: &[StepId],
        status: JobStatus,
        started_at: &str,
        error: Option<ErrorInfo>,
    ) -> Result<(), OjError> {
        let mut report = String::new();
        let mut patch = String::new();
        let mut logs = String::new();
        let mut steps = Vec::new();

        for step_id in executed {
            for (buf, name) in [(&mut report, "report.md"), (&mut patch, "patch.diff"), (&mut logs, "logs.txt")] {
                if let Some(text) = self.store.read_text(job_id.as_str(), &format!("steps/{step_id}/{name}"))? {
                    buf.push_str(&text);
                    buf.push('\n');
                }
            }
            if let Some(bytes) = self.store.read_bytes(job_id.as_str(), &format!("steps/{step_id}/result.json"))? {
                if let Ok(result) = serde_json::from_slice::<StepResult>(&bytes) {
                    steps.push(result);
                }
            }
        }

        self.store.write_text(job_id.as_str(), "report.md", &report)?;
        self.store.write_text(job_id.as_str(), "patch.diff", &patch)?;
        self.store.write_text(job_id.as_str(), "logs.txt", &logs)?;

        let ended_at = self.clock.now_utc().to_rfc3339();
        let job_result = JobResult {
            kind: "job".to_string(),
            job_id: job_id.clone(),
            status,
            steps,
            started_at: started_at.to_string(),
            ended_at,
            error,
        };
        self.store.write_json(job_id.as_str(), "result.json", &job_result)?;
        Ok(())
    }
}

enum Escalation {
    Stop,
    AskHuman,
    Continued,
    Looped,
}

async fn run_with_timeout(worker: &dyn oj_adapters::Worker, ctx: &StepContext) -> StepOutcome {
    let run_fut = worker.run(ctx);
    tokio::pin!(run_fut);
    tokio::select! {
        outcome = &mut run_fut => outcome,
        _ = tokio::time::sleep(ctx.timeout) => {
            ctx.cancel.cancel();
            match tokio::time::timeout(Duration::from_secs(5), run_fut).await {
                Ok(outcome) => outcome,
                Err(_) => StepOutcome::failed(ErrorInfo::new(
                    "timeout",
                    format!("step {} exceeded its {:?} timeout", ctx.step.step_id, ctx.timeout),
                )),
            }
        }
    }
}

fn build_redactor(config: &Config, policy: &ExecutionPolicy) -> Redactor {
    let mut redactor = Redactor::new(config.redact_min_literal_len);
    for name in &policy.sensitive_env_vars {
        if let Ok(value) = std::env::var(name) {
            redactor = redactor.with_literal(value);
        }
    }
    redactor
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
