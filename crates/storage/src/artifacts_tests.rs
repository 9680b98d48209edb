// SPDX-License-Identifier: MIT

use super::*;

fn store() -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    (dir, ArtifactStore::new(dir.path()))
}

#[test]
fn write_then_read_round_trips() {
    let (_dir, store) = store();
    store.write_text("j1", "report.md", "hello").unwrap();
    assert_eq!(store.read_text("j1", "report.md").unwrap(), Some("hello".to_string()));
}

#[test]
fn write_creates_nested_step_directories() {
    let (_dir, store) = store();
    let path = store.write_text("j1", "steps/01_plan/report.md", "hi").unwrap();
    assert!(path.is_file());
}

#[test]
fn rejects_absolute_path() {
    let (_dir, store) = store();
    let err = store.write_text("j1", "/etc/passwd", "x").unwrap_err();
    assert!(matches!(err, OjError::PathTraversal(_)));
}

#[test]
fn rejects_parent_dir_escape() {
    let (_dir, store) = store();
    let err = store.write_text("j1", "../../etc/passwd", "x").unwrap_err();
    assert!(matches!(err, OjError::PathTraversal(_)));
}

#[test]
fn rejects_escape_even_when_nested_deeper_first() {
    let (_dir, store) = store();
    // Net effect still escapes even though some components descend first.
    let err = store.write_text("j1", "steps/../../escape.txt", "x").unwrap_err();
    assert!(matches!(err, OjError::PathTraversal(_)));
}

#[test]
fn escape_attempt_leaves_no_partial_file() {
    let (dir, store) = store();
    let _ = store.write_text("j1", "../escape.txt", "x");
    assert!(!dir.path().join("escape.txt").exists());
    assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
}

#[test]
fn resolved_path_is_always_inside_job_root() {
    let (_dir, store) = store();
    let resolved = store.resolve("j1", "steps/01_plan/logs.txt").unwrap();
    assert!(resolved.starts_with(store.job_root("j1")));
}

#[test]
fn missing_file_reads_as_none() {
    let (_dir, store) = store();
    assert_eq!(store.read_text("j1", "nope.txt").unwrap(), None);
}

#[test]
fn write_json_sorts_keys_deterministically() {
    let (_dir, store) = store();
    let value = serde_json::json!({"b": 1, "a": 2});
    store.write_json("j1", "result.json", &value).unwrap();
    let text = store.read_text("j1", "result.json").unwrap().unwrap();
    let a_idx = text.find("\"a\"").unwrap();
    let b_idx = text.find("\"b\"").unwrap();
    assert!(a_idx < b_idx);
}

#[test]
fn exists_reflects_written_files() {
    let (_dir, store) = store();
    assert!(!store.exists("j1", "report.md").unwrap());
    store.write_text("j1", "report.md", "x").unwrap();
    assert!(store.exists("j1", "report.md").unwrap());
}
