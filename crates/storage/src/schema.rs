// SPDX-License-Identifier: MIT

//! The enqueue-time JSON-schema gate. Required/optional fields and
//! "additional properties are rejected" are enforced by `JobSpec`'s own
//! `#[serde(deny_unknown_fields)]` derive; this module adds the structural
//! invariants serde can't express (non-empty steps, unique step ids, `goto`
//! targets) and turns both kinds of failure into one `validation_error`.

use oj_core::{JobSpec, OjError};

pub fn validate_job_spec_json(raw: &[u8]) -> Result<JobSpec, OjError> {
    let spec: JobSpec =
        serde_json::from_slice(raw).map_err(|e| OjError::Validation(e.to_string()))?;
    spec.validate().map_err(|e| OjError::Validation(e.to_string()))?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_job() {
        let raw = br#"{
            "job_id": "j1", "goal": "demo", "workdir": "demo",
            "steps": [{"step_id": "01_plan", "agent": "opencode"}]
        }"#;
        assert!(validate_job_spec_json(raw).is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let raw = br#"{"goal": "demo", "workdir": "demo", "steps": []}"#;
        assert!(validate_job_spec_json(raw).is_err());
    }

    #[test]
    fn rejects_additional_properties() {
        let raw = br#"{
            "job_id": "j1", "goal": "demo", "workdir": "demo", "steps": [],
            "bogus": true
        }"#;
        assert!(validate_job_spec_json(raw).is_err());
    }

    #[test]
    fn rejects_empty_steps_via_validate() {
        let raw = br#"{"job_id": "j1", "goal": "demo", "workdir": "demo", "steps": []}"#;
        let err = validate_job_spec_json(raw).unwrap_err();
        assert!(matches!(err, OjError::Validation(_)));
    }
}
