// SPDX-License-Identifier: MIT

//! Unified error type. Every wire `error.code` the system can emit is a
//! variant here; [`OjError::code`] returns the exact wire string so
//! [`crate::result::ErrorInfo`] can serialize it without a separate lookup
//! table.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationError,
    DuplicateJob,
    QueueEmpty,
    WorkerNotFound,
    WorkerContractViolation,
    Timeout,
    BudgetExceeded,
    SubprocessExitNonzero,
    PolicyViolation,
    PathTraversal,
    TransientIo,
    StepTransitionLimit,
    RunnerShutdown,
    PreflightFailed,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::DuplicateJob => "duplicate_job",
            ErrorKind::QueueEmpty => "queue_empty",
            ErrorKind::WorkerNotFound => "worker_not_found",
            ErrorKind::WorkerContractViolation => "worker_contract_violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::SubprocessExitNonzero => "subprocess_exit_nonzero",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::PathTraversal => "path_traversal",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::StepTransitionLimit => "step_transition_limit",
            ErrorKind::RunnerShutdown => "runner_shutdown",
            ErrorKind::PreflightFailed => "preflight_failed",
        }
    }

    /// Whether an attempt failing with this kind may be retried by the
    /// runner's attempt loop.
    pub fn retriable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::TransientIo)
    }
}

#[derive(Debug, Error)]
pub enum OjError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("duplicate job id {0}")]
    DuplicateJob(String),
    #[error("queue is empty")]
    QueueEmpty,
    #[error("no worker registered for agent {0:?}")]
    WorkerNotFound(String),
    #[error("worker contract violation: {0}")]
    WorkerContractViolation(String),
    #[error("step timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("daily budget exceeded for worker {0:?}")]
    BudgetExceeded(String),
    #[error("subprocess exited with status {0}")]
    SubprocessExitNonzero(i32),
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("path traversal attempt: {0}")]
    PathTraversal(String),
    #[error("transient I/O error: {0}")]
    TransientIo(String),
    #[error("step transition limit exceeded ({0} transitions)")]
    StepTransitionLimit(u32),
    #[error("runner shutdown before step completion")]
    RunnerShutdown,
    #[error("preflight check failed: {0}")]
    PreflightFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OjError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OjError::Validation(_) => ErrorKind::ValidationError,
            OjError::DuplicateJob(_) => ErrorKind::DuplicateJob,
            OjError::QueueEmpty => ErrorKind::QueueEmpty,
            OjError::WorkerNotFound(_) => ErrorKind::WorkerNotFound,
            OjError::WorkerContractViolation(_) => ErrorKind::WorkerContractViolation,
            OjError::Timeout(_) => ErrorKind::Timeout,
            OjError::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            OjError::SubprocessExitNonzero(_) => ErrorKind::SubprocessExitNonzero,
            OjError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            OjError::PathTraversal(_) => ErrorKind::PathTraversal,
            OjError::TransientIo(_) => ErrorKind::TransientIo,
            OjError::StepTransitionLimit(_) => ErrorKind::StepTransitionLimit,
            OjError::RunnerShutdown => ErrorKind::RunnerShutdown,
            OjError::PreflightFailed(_) => ErrorKind::PreflightFailed,
            OjError::Io(_) => ErrorKind::TransientIo,
            OjError::Json(_) => ErrorKind::ValidationError,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}
