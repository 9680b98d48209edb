// SPDX-License-Identifier: MIT

//! `StepCursor` — the sole place that understands step movement. A job's
//! steps are a flat, indexable `Vec<StepId>`, never a recursive call graph;
//! the cursor is just an index into it plus a transition counter checked
//! against a fixed budget.

use oj_core::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Advance to the step immediately after the current one.
    Next,
    /// Re-run the current step (a retry; does not count as a transition).
    Retry,
    /// Jump to the step identified by `StepId`, forward or backward.
    Goto(usize),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("step transition limit exceeded ({0} transitions)")]
    TransitionLimitExceeded(u32),
    #[error("goto target index {0} is out of range")]
    IndexOutOfRange(usize),
}

/// Indexes into a job's flattened step list. Constructed fresh from
/// `JobState` on every claim; never persists anything itself — the runner
/// writes `state.json.cursor`/`state.json.transitions` after every move.
pub struct StepCursor<'a> {
    steps: &'a [StepId],
    position: usize,
    transitions: u32,
    limit: u32,
}

impl<'a> StepCursor<'a> {
    pub fn new(steps: &'a [StepId], position: usize, transitions: u32, limit: u32) -> Self {
        Self { steps, position, transitions, limit }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    pub fn current(&self) -> Option<&'a StepId> {
        self.steps.get(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.steps.len()
    }

    pub fn index_of(&self, target: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| s == target)
    }

    /// Applies one move, bumping the transition counter for every move
    /// except `Retry` (a retry re-attempts the same step; only `goto` and
    /// forward progress count against the budget, which bounds total
    /// *step* transitions, not attempts).
    pub fn apply(&mut self, mv: Move) -> Result<(), CursorError> {
        match mv {
            Move::Retry => Ok(()),
            Move::Next => {
                self.bump()?;
                self.position += 1;
                Ok(())
            }
            Move::Goto(index) => {
                if index > self.steps.len() {
                    return Err(CursorError::IndexOutOfRange(index));
                }
                self.bump()?;
                self.position = index;
                Ok(())
            }
        }
    }

    fn bump(&mut self) -> Result<(), CursorError> {
        if self.transitions >= self.limit {
            return Err(CursorError::TransitionLimitExceeded(self.transitions));
        }
        self.transitions += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
