//! Durable log events.
//!
//! Each lifecycle edge of an execution or attempt emits exactly one event.
//! Events with no attempt reference are workflow-level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AttemptId, ExecutionId, LogEventId};

/// One structured event in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub id: LogEventId,
    pub workflow_execution_id: ExecutionId,
    /// Absent for workflow-level events.
    pub step_attempt_id: Option<AttemptId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl LogEvent {
    /// A workflow-level event.
    pub fn workflow(
        workflow_execution_id: ExecutionId,
        message: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            id: LogEventId::new(),
            workflow_execution_id,
            step_attempt_id: None,
            message: message.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// An event scoped to one step attempt.
    pub fn step(
        workflow_execution_id: ExecutionId,
        step_attempt_id: AttemptId,
        message: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            id: LogEventId::new(),
            workflow_execution_id,
            step_attempt_id: Some(step_attempt_id),
            message: message.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    pub fn is_workflow_level(&self) -> bool {
        self.step_attempt_id.is_none()
    }
}
