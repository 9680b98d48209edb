// SPDX-License-Identifier: MIT

//! Materializes a step's `input_artifacts` into the worker's view,
//! enforcing `max_input_artifacts_files`, the per-file character cap, and
//! the total character cap across all files. Truncation appends a fixed
//! marker and never splits a UTF-8 character boundary.

use oj_core::ExecutionPolicy;
use oj_storage::ArtifactStore;
use std::path::PathBuf;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MaterializeInputsError {
    #[error("too many input artifacts: {found} exceeds max_input_artifacts_files={max}")]
    TooManyFiles { found: usize, max: usize },
    #[error(transparent)]
    Io(#[from] oj_core::OjError),
}

#[derive(Debug, Clone, Default)]
pub struct MaterializedInputs {
    /// Relative-path -> final (possibly truncated) text content.
    pub files: Vec<(String, String)>,
    pub truncated_files: Vec<String>,
}

/// Reads each of `relative_paths` from the job's artifact store, truncating
/// per-file and in aggregate per `policy`, then writes each into
/// `dest_dir/<relative_path>` so the worker sees plain files on disk.
pub fn materialize_inputs(
    store: &ArtifactStore,
    job_id: &str,
    relative_paths: &[String],
    policy: &ExecutionPolicy,
    dest_dir: &std::path::Path,
) -> Result<MaterializedInputs, MaterializeInputsError> {
    if relative_paths.len() > policy.max_input_artifacts_files {
        return Err(MaterializeInputsError::TooManyFiles {
            found: relative_paths.len(),
            max: policy.max_input_artifacts_files,
        });
    }

    let mut result = MaterializedInputs::default();
    let mut total_chars_used = 0usize;

    for relative in relative_paths {
        let text = store.read_text(job_id, relative)?.unwrap_or_default();
        let per_file_budget = policy.max_input_artifact_chars;
        let remaining_total = policy.max_input_artifacts_chars_total.saturating_sub(total_chars_used);
        let budget = per_file_budget.min(remaining_total);

        let (content, was_truncated) = truncate_with_marker(&text, budget);
        total_chars_used += content.chars().count();
        if was_truncated {
            result.truncated_files.push(relative.clone());
        }

        let dest_path = dest_dir.join(relative);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(oj_core::OjError::from)?;
        }
        std::fs::write(&dest_path, &content).map_err(oj_core::OjError::from)?;
        result.files.push((relative.clone(), content));
    }

    Ok(result)
}

/// Truncates `text` to at most `budget` chars, splitting only at a
/// character boundary, and appends `\n...[truncated: N chars omitted]\n`
/// when truncation occurred.
fn truncate_with_marker(text: &str, budget: usize) -> (String, bool) {
    let total_chars = text.chars().count();
    if total_chars <= budget {
        return (text.to_string(), false);
    }
    let kept: String = text.chars().take(budget).collect();
    let omitted = total_chars - budget;
    let marker = format!("\n...[truncated: {omitted} chars omitted]\n");
    (format!("{kept}{marker}"), true)
}

pub fn dest_path_for(dest_dir: &std::path::Path, relative: &str) -> PathBuf {
    dest_dir.join(relative)
}

#[cfg(test)]
#[path = "input_materializer_tests.rs"]
mod tests;
