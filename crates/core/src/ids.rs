// SPDX-License-Identifier: MIT

//! `job_id` / `step_id` validation.
//!
//! Both are externally supplied (not generated here): a `job_id` may contain
//! any character except a path separator, and may not start with `.`. A
//! `step_id` must be a safe filename token: letters, digits, `_`, `-`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("job_id must not be empty")]
    Empty,
    #[error("job_id must not start with '.'")]
    LeadingDot,
    #[error("job_id must not contain a path separator")]
    PathSeparator,
    #[error("step_id must not be empty")]
    EmptyStep,
    #[error("step_id {0:?} must be letters, digits, '_' or '-' only")]
    UnsafeStepToken(String),
}

fn validate_job_id(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.starts_with('.') {
        return Err(IdError::LeadingDot);
    }
    if s.contains('/') || s.contains('\\') {
        return Err(IdError::PathSeparator);
    }
    Ok(())
}

fn validate_step_id(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::EmptyStep);
    }
    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(IdError::UnsafeStepToken(s.to_string()));
    }
    Ok(())
}

macro_rules! define_opaque_id {
    ($name:ident, $validate:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
                let s = s.into();
                $validate(&s)?;
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;
            fn try_from(s: String) -> Result<Self, IdError> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_opaque_id!(JobId, validate_job_id);
define_opaque_id!(StepId, validate_step_id);

#[cfg(any(test, feature = "test-support"))]
impl JobId {
    /// Only for tests/builders; panics on invalid input rather than
    /// threading a `Result` through every fixture.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        #[allow(clippy::unwrap_used)]
        Self::parse(s).unwrap()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl StepId {
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        #[allow(clippy::unwrap_used)]
        Self::parse(s).unwrap()
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
