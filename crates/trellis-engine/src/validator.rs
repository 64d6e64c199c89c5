//! JSON-schema validation for step inputs and outputs.
//!
//! A violation never raises: it synthesizes a permanent
//! `VALIDATION_ERROR` that becomes the step result. Input violations are
//! detected before the step is invoked; output violations rewrite the
//! step's success into a failure while preserving its metadata.

use serde_json::Value;
use std::fmt;

use trellis_core::StepError;

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Validates `payload` against `schema`. Returns the synthesized error on
/// violation, `None` when the payload conforms.
pub fn check(schema: &Value, payload: &Value, direction: Direction) -> Option<StepError> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            // A broken schema is a declaration bug; it must not retry.
            return Some(StepError::permanent(
                VALIDATION_ERROR,
                format!("invalid {direction} schema: {e}"),
            ));
        }
    };

    let violations: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| e.to_string())
        .collect();
    if violations.is_empty() {
        return None;
    }

    tracing::debug!(%direction, violations = violations.len(), "Schema validation failed");
    Some(StepError::permanent(
        VALIDATION_ERROR,
        format!("{direction} validation failed: {}", violations.join("; ")),
    ))
}
