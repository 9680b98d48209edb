// SPDX-License-Identifier: MIT

//! The artifact store: every write under
//! `artifacts/<job_id>/...` is path-traversal-checked and atomic
//! (write-temp-then-rename within the destination's own directory).

use oj_core::OjError;
use serde::Serialize;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn job_root(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Resolves `relative` against the job's artifact root and verifies the
    /// fully-normalized result stays strictly inside it. Returns
    /// `OjError::PathTraversal` otherwise — this check is purely lexical
    /// (component-wise `..`/absolute rejection), since the target file may
    /// not exist yet and `canonicalize` would fail on it.
    pub fn resolve(&self, job_id: &str, relative: &str) -> Result<PathBuf, OjError> {
        let job_root = self.job_root(job_id);
        let rel_path = Path::new(relative);
        if rel_path.is_absolute() {
            return Err(OjError::PathTraversal(relative.to_string()));
        }
        let mut normalized = PathBuf::new();
        for component in rel_path.components() {
            use std::path::Component;
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(OjError::PathTraversal(relative.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(OjError::PathTraversal(relative.to_string()));
                }
            }
        }
        Ok(job_root.join(normalized))
    }

    /// Atomically writes `bytes` to `job_id`/`relative`, creating parent
    /// directories with default permissions first. Leaves no partial file
    /// behind on a traversal rejection.
    pub fn write_bytes(&self, job_id: &str, relative: &str, bytes: &[u8]) -> Result<PathBuf, OjError> {
        let target = self.resolve(job_id, relative)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = target.with_file_name(tmp_name);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(target)
    }

    pub fn write_text(&self, job_id: &str, relative: &str, text: &str) -> Result<PathBuf, OjError> {
        self.write_bytes(job_id, relative, text.as_bytes())
    }

    /// Serializes `value` with deterministic (sorted) key order to keep
    /// content hashes stable across runs, by routing through a
    /// `BTreeMap`-backed `serde_json::Value` before final serialization.
    pub fn write_json<T: Serialize>(&self, job_id: &str, relative: &str, value: &T) -> Result<PathBuf, OjError> {
        let value = serde_json::to_value(value)?;
        let sorted = sort_json_keys(value);
        let bytes = serde_json::to_vec_pretty(&sorted)?;
        self.write_bytes(job_id, relative, &bytes)
    }

    pub fn read_bytes(&self, job_id: &str, relative: &str) -> Result<Option<Vec<u8>>, OjError> {
        let target = self.resolve(job_id, relative)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_text(&self, job_id: &str, relative: &str) -> Result<Option<String>, OjError> {
        Ok(self.read_bytes(job_id, relative)?.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    pub fn exists(&self, job_id: &str, relative: &str) -> Result<bool, OjError> {
        Ok(self.resolve(job_id, relative)?.exists())
    }
}

fn sort_json_keys(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_json_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
