// SPDX-License-Identifier: MIT

//! The worker contract: a worker is identified by a name and exposes a
//! single `run(ctx)` operation. The core makes no assumption about
//! whether a worker spawns a subprocess, calls an HTTP API, or is a pure
//! simulation stub.

use async_trait::async_trait;
use oj_core::{ErrorInfo, ExecutionPolicy, JobSpec, Redactor, StepSpec, StepStatus};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a worker needs to execute one attempt of one step. `step_dir`
/// is the only writable root the worker may use; `workspace_dir` is the
/// materialized repository checkout the agent operates on.
pub struct StepContext {
    pub job: JobSpec,
    pub step: StepSpec,
    pub policy: ExecutionPolicy,
    pub step_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub redactor: Redactor,
    pub attempt: u32,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl StepContext {
    /// Reads the materialized view of one input artifact, already
    /// truncated by the engine's input materializer before the worker ever
    /// sees it.
    pub fn input_path(&self, relative: &str) -> PathBuf {
        self.workspace_dir.join(relative)
    }
}

/// What a worker produced for one attempt. The engine is the sole owner of
/// `attempts`/`started_at`/`ended_at`/the artifact list reconciliation — a
/// worker reports only its own outcome.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub error: Option<ErrorInfo>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self { status: StepStatus::Ok, error: None }
    }

    pub fn failed(error: ErrorInfo) -> Self {
        Self { status: StepStatus::Failed, error: Some(error) }
    }

    pub fn needs_human(error: ErrorInfo) -> Self {
        Self { status: StepStatus::NeedsHuman, error: Some(error) }
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Runs one attempt. Implementations MUST write `report.md`,
    /// `patch.diff`, and `logs.txt` to `ctx.step_dir` before returning —
    /// the engine checks for their presence and fails the attempt with
    /// `worker_contract_violation` if any are missing. Implementations
    /// MUST honor `ctx.cancel` within a bounded grace period and MUST NOT
    /// invoke a binary whose basename is absent from
    /// `ctx.policy.allowed_binaries`.
    async fn run(&self, ctx: &StepContext) -> StepOutcome;
}
