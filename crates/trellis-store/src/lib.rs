//! Trellis store: the append-only persistence port and its backends.
//!
//! The engine only ever talks to [`ExecutionStore`]. Two backends ship
//! here: Postgres (sqlx) for production and an in-process memory store
//! used by tests and embedded deployments.

pub mod memory;
pub mod migrations;
pub mod port;
pub mod postgres;

pub use memory::MemoryStore;
pub use migrations::{apply_migrations, Migration};
pub use port::ExecutionStore;
pub use postgres::PgExecutionStore;

use trellis_core::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot modify {entity} {id}: execution history is immutable")]
    ImmutabilityViolation { entity: &'static str, id: String },

    #[error("duplicate step order {order} in workflow {workflow_id}")]
    DuplicateStepOrder { workflow_id: String, order: u32 },

    #[error("migration error: {0}")]
    Migration(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn immutability_violation(entity: &'static str, id: impl Into<String>) -> Self {
        Self::ImmutabilityViolation {
            entity,
            id: id.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::ImmutabilityViolation { entity, id } => {
                EngineError::ImmutabilityViolation { entity, id }
            }
            StoreError::DuplicateStepOrder { workflow_id, order } => {
                EngineError::DuplicateStepOrder { workflow_id, order }
            }
            other => EngineError::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
