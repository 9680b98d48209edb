// SPDX-License-Identifier: MIT

//! `oj approve` — releases a job held in `awaiting_approval/` back to `pending/`.

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use oj_core::Config;
use oj_storage::Queue;

pub fn handle(job_id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::from_env();
    let queue = Queue::open(&config.queue_root)?;
    queue.approve(job_id).map_err(|e| ExitError::new(3, e.to_string()))?;

    format_or_json(format, &serde_json::json!({"job_id": job_id, "status": "pending"}), || {
        println!("{job_id} approved, returned to pending");
    })
}
