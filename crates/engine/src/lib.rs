// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-engine: everything that turns a queued job into a finished one —
//! the step cursor, input materialization, the daily budget gate, the
//! cron scheduler, the retention sweeper, and the runner loop that ties
//! them together.

pub mod budget;
pub mod cursor;
pub mod input_materializer;
pub mod retention;
pub mod runner;
pub mod scheduler;

pub use budget::BudgetGate;
pub use cursor::{CursorError, Move, StepCursor};
pub use input_materializer::{materialize_inputs, MaterializeInputsError, MaterializedInputs};
pub use retention::{sweep, SweepReport};
pub use runner::{JobOutcome, Runner};
pub use scheduler::{load_entries_from_file, CronScheduler, ScheduleEntry};
