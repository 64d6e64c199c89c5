//! Typed identifiers for domain entities.
//!
//! Every entity gets its own newtype over `Uuid` so ids cannot be
//! mixed up across entity boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a workflow definition.
    WorkflowId
);
entity_id!(
    /// Identifier of a step declaration inside a workflow.
    StepId
);
entity_id!(
    /// Identifier of a single workflow execution.
    ExecutionId
);
entity_id!(
    /// Identifier of a single step attempt.
    AttemptId
);
entity_id!(
    /// Identifier of a log event.
    LogEventId
);
