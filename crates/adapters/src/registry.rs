// SPDX-License-Identifier: MIT

//! `WorkerRegistry` — the process-wide `agent name -> Worker` map, built
//! once at daemon startup and read-only after construction, just like
//! `Config`.

use crate::worker::Worker;
use oj_core::OjError;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self { workers: HashMap::new() }
    }

    pub fn register(mut self, name: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(name.into(), worker);
        self
    }

    /// Looks up the worker for `agent`, failing with `worker_not_found`
    /// rather than panicking — an unrecognized `agent` in a `StepSpec` is
    /// an operator error, not a programming error.
    pub fn get(&self, agent: &str) -> Result<Arc<dyn Worker>, OjError> {
        self.workers.get(agent).cloned().ok_or_else(|| OjError::WorkerNotFound(agent.to_string()))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
