// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-core: data model, error kinds, clock, config, and log redaction shared
//! by every other crate in the workspace. No I/O lives here except reading
//! environment variables for [`config::Config`].

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod job_spec;
pub mod macros;
pub mod policy;
pub mod redact;
pub mod result;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::Config;
pub use error::{ErrorKind, OjError};
pub use ids::{JobId, StepId};
pub use job_spec::{JobSpec, OnFailure, StepSpec, WorkDir};
pub use policy::ExecutionPolicy;
pub use redact::Redactor;
pub use result::{ErrorInfo, JobResult, JobState, JobStatus, StepRecord, StepResult, StepStatus};
