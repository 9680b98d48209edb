// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-adapters: the worker contract and the three concrete
//! workers that ship with the daemon — `SimulationWorker`,
//! `SubprocessWorker`, and `ApiWorker`.

pub mod api;
pub mod registry;
pub mod simulation;
pub mod subprocess;
pub mod worker;

pub use api::{ApiCallError, ApiClient, ApiRequest, ApiResponse, ApiWorker, ReqwestApiClient};
pub use registry::WorkerRegistry;
pub use simulation::SimulationWorker;
pub use subprocess::{AgentBinary, SubprocessWorker};
pub use worker::{StepContext, StepOutcome, Worker};
