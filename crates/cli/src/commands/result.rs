// SPDX-License-Identifier: MIT

//! `oj result` — prints a job's `result.json`, or its queue location if it
//! hasn't reached a terminal state yet.

use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use oj_core::Config;
use oj_storage::{ArtifactStore, Queue};

pub fn handle(job_id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::from_env();
    let queue = Queue::open(&config.queue_root)?;
    let store = ArtifactStore::new(&config.artifacts_root);

    if let Some(raw) = store.read_text(job_id, "result.json")? {
        match format {
            OutputFormat::Json => {
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Text => println!("{raw}"),
        }
        return Ok(());
    }

    match queue.locate(job_id)? {
        Some(dir) => Err(ExitError::new(4, format!("job {job_id} has no result yet (currently in {dir})")).into()),
        None => Err(ExitError::new(1, format!("job {job_id} not found")).into()),
    }
}
