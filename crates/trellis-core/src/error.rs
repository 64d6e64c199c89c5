use thiserror::Error;

/// Errors raised by the execution core.
///
/// Step failures are *not* errors: they are recorded on the attempt and
/// flow through [`crate::contract::StepResult`]. This enum covers the
/// operational failures that abort an orchestration call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot modify {entity} {id}: execution history is immutable")]
    ImmutabilityViolation { entity: &'static str, id: String },

    #[error("retry not allowed: {reason}")]
    RetryNotAllowed { reason: String },

    #[error("duplicate step order {order} in workflow {workflow_id}")]
    DuplicateStepOrder { workflow_id: String, order: u32 },

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_transition(
        entity: &'static str,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn retry_not_allowed(reason: impl Into<String>) -> Self {
        Self::RetryNotAllowed {
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// True for errors a host should map to a client fault (4xx) rather
    /// than an operational failure.
    pub fn is_retry_refusal(&self) -> bool {
        matches!(
            self,
            EngineError::RetryNotAllowed { .. } | EngineError::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
