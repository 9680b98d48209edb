// SPDX-License-Identifier: MIT

//! `oj submit` — validates and enqueues a job spec file.

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use oj_core::Config;
use oj_storage::{validate_job_spec_json, Queue};
use std::path::Path;

pub fn handle(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let raw = std::fs::read(path).map_err(|e| ExitError::new(1, format!("cannot read {}: {e}", path.display())))?;
    let spec = validate_job_spec_json(&raw).map_err(|e| ExitError::new(2, e.to_string()))?;

    let config = Config::from_env();
    let queue = Queue::open(&config.queue_root)?;
    let job_id = queue.enqueue(&spec).map_err(|e| ExitError::new(3, e.to_string()))?;

    format_or_json(format, &serde_json::json!({"job_id": job_id.to_string()}), || {
        println!("enqueued {}", job_id);
    })
}
