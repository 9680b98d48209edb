// SPDX-License-Identifier: MIT

use super::*;
use oj_core::test_support::{job_spec, step};
use std::thread::sleep;
use std::time::Duration;

fn open_tmp() -> (tempfile::TempDir, Queue) {
    let dir = tempfile::tempdir().unwrap();
    let queue = Queue::open(dir.path()).unwrap();
    (dir, queue)
}

#[test]
fn open_creates_all_five_state_directories() {
    let (dir, _queue) = open_tmp();
    for name in ["pending", "running", "done", "failed", "awaiting_approval"] {
        assert!(dir.path().join(name).is_dir());
    }
}

#[test]
fn enqueue_then_read_back_round_trips() {
    let (dir, queue) = open_tmp();
    let spec = job_spec("j1", vec![step("01_plan", "opencode")]);
    queue.enqueue(&spec).unwrap();
    let path = dir.path().join("pending/j1.json");
    assert!(path.is_file());
    let back: oj_core::JobSpec = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(back, spec);
}

#[test]
fn duplicate_enqueue_rejected_regardless_of_location() {
    let (_dir, queue) = open_tmp();
    let spec = job_spec("j1", vec![step("01_plan", "opencode")]);
    queue.enqueue(&spec).unwrap();
    let (job_id, _spec, _path) = queue.claim().unwrap();
    queue.complete(job_id.as_str(), Terminal::Done).unwrap();

    let err = queue.enqueue(&spec).unwrap_err();
    assert!(matches!(err, OjError::DuplicateJob(_)));
}

#[test]
fn claim_returns_queue_empty_when_nothing_pending() {
    let (_dir, queue) = open_tmp();
    assert!(matches!(queue.claim(), Err(OjError::QueueEmpty)));
}

#[test]
fn claim_picks_oldest_pending_first() {
    let (_dir, queue) = open_tmp();
    queue.enqueue(&job_spec("older", vec![step("a", "opencode")])).unwrap();
    sleep(Duration::from_millis(20));
    queue.enqueue(&job_spec("newer", vec![step("a", "opencode")])).unwrap();

    let (job_id, _, _) = queue.claim().unwrap();
    assert_eq!(job_id.as_str(), "older");
}

#[test]
fn claim_moves_file_to_running() {
    let (dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    queue.claim().unwrap();
    assert!(!dir.path().join("pending/j1.json").exists());
    assert!(dir.path().join("running/j1.json").exists());
}

#[test]
fn complete_moves_to_requested_terminal_dir() {
    let (dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    queue.claim().unwrap();
    queue.complete("j1", Terminal::Failed).unwrap();
    assert!(dir.path().join("failed/j1.json").exists());
}

#[test]
fn complete_is_idempotent() {
    let (_dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    queue.claim().unwrap();
    queue.complete("j1", Terminal::Done).unwrap();
    // Second call: file is already in done/, not running/ — must not error.
    queue.complete("j1", Terminal::Done).unwrap();
}

#[test]
fn complete_missing_source_raises() {
    let (_dir, queue) = open_tmp();
    assert!(queue.complete("nonexistent", Terminal::Done).is_err());
}

#[test]
fn approve_moves_awaiting_approval_to_pending() {
    let (dir, queue) = open_tmp();
    std::fs::write(dir.path().join("awaiting_approval/j1.json"), b"{}").unwrap();
    queue.approve("j1").unwrap();
    assert!(dir.path().join("pending/j1.json").exists());
}

#[test]
fn unlock_moves_running_to_pending() {
    let (dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    queue.claim().unwrap();
    queue.unlock("j1").unwrap();
    assert!(dir.path().join("pending/j1.json").exists());
}

#[test]
fn find_job_files_exact_and_dotted_suffix_never_bare_prefix() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["job-1.json", "job-1.2.json", "job-12.json"] {
        std::fs::write(dir.path().join(name), b"{}").unwrap();
    }
    let mut found: Vec<String> = Queue::find_job_files(dir.path(), "job-1")
        .unwrap()
        .into_iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    found.sort();
    assert_eq!(found, vec!["job-1.2.json".to_string(), "job-1.json".to_string()]);
}

#[test]
fn reclaim_returns_job_to_pending_before_max_attempts() {
    let (dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    queue.claim().unwrap();
    // Force the running file to look old by rewriting its mtime via touch-like trick:
    // Duration::ZERO makes every running file "stale" immediately.
    let outcomes = queue.reclaim_stale_running(Duration::from_secs(0), 3).unwrap();
    assert_eq!(outcomes, vec![ReclaimOutcome::Requeued(oj_core::JobId::parse("j1").unwrap(), 1)]);
    assert!(dir.path().join("pending/j1.json").exists());
}

#[test]
fn reclaim_fails_job_after_max_attempts_exceeded() {
    let (dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    for _ in 0..3 {
        queue.claim().unwrap();
        let outcomes = queue.reclaim_stale_running(Duration::from_secs(0), 2).unwrap();
        if let Some(ReclaimOutcome::Failed(_)) = outcomes.first() {
            break;
        }
    }
    assert!(dir.path().join("failed/j1.json").exists());
}

#[test]
fn locate_reports_current_directory() {
    let (_dir, queue) = open_tmp();
    queue.enqueue(&job_spec("j1", vec![step("a", "opencode")])).unwrap();
    assert_eq!(queue.locate("j1").unwrap(), Some(QueueDir::Pending));
    queue.claim().unwrap();
    assert_eq!(queue.locate("j1").unwrap(), Some(QueueDir::Running));
}
