// SPDX-License-Identifier: MIT

//! `oj status` — with no `job_id`, prints queue depth per state directory;
//! with one, prints that job's current location, goal, and step count.

use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use oj_core::Config;
use oj_storage::Queue;

pub fn handle(job_id: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::from_env();
    let queue = Queue::open(&config.queue_root)?;

    match job_id {
        Some(job_id) => {
            let Some(dir) = queue.locate(job_id)? else {
                return Err(ExitError::new(1, format!("job {job_id} not found")).into());
            };
            let spec = queue.read_spec(job_id)?;

            format_or_json(
                format,
                &serde_json::json!({
                    "job_id": job_id,
                    "state": dir.to_string(),
                    "goal": spec.as_ref().map(|s| s.goal.as_str()),
                    "steps": spec.as_ref().map(|s| s.steps.len()),
                }),
                || {
                    println!("{job_id}: {dir}");
                    if let Some(spec) = &spec {
                        println!("  goal: {}", spec.goal);
                        println!("  steps: {}", spec.steps.len());
                    }
                },
            )
        }
        None => {
            let counts = queue.counts()?;

            format_or_json(
                format,
                &serde_json::json!(counts
                    .iter()
                    .map(|(dir, n)| (dir.to_string(), n))
                    .collect::<std::collections::BTreeMap<_, _>>()),
                || {
                    for (dir, n) in &counts {
                        println!("{dir:<18} {n}");
                    }
                },
            )
        }
    }
}
