//! The step executor contract.
//!
//! Every step implementation exposes a single `execute` operation and never
//! lets an error escape: the outcome is always a [`StepResult`]. The
//! executor composes implementations through this contract alone and never
//! inspects what kind of step it is running.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::execution::ErrorClass;
use crate::ids::{AttemptId, ExecutionId, StepId, WorkflowId};
use crate::workflow::Step;

/// Per-attempt context handed to every step.
///
/// `trigger_input` is the original input of the workflow execution and is
/// never replaced by step outputs. `retry_count` is the durable position
/// of this attempt in its retry chain.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_execution_id: ExecutionId,
    pub step_attempt_id: AttemptId,
    pub workflow_id: WorkflowId,
    pub step_id: StepId,
    pub trigger_input: Value,
    pub retry_count: u32,
}

/// Timing evidence attached to every step result.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMetadata {
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Executor-specific extras, persisted onto the attempt
    /// (e.g. AI provider/model/prompt id).
    pub extra: Option<Value>,
}

impl StepMetadata {
    /// Closes the timing bracket opened at `started_at`.
    pub fn capture(started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            duration_ms,
            started_at,
            finished_at,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// A step failure. `class` is the source of truth for retry decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct StepError {
    pub code: String,
    pub message: String,
    pub class: ErrorClass,
}

impl StepError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            class: ErrorClass::Transient,
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            class: ErrorClass::Permanent,
        }
    }

    pub fn retryable(&self) -> bool {
        self.class.is_transient()
    }

    /// The form persisted on the attempt record.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.code, self.message)
    }
}

/// Outcome of one step execution: success with output, or failure with an
/// error. No other shape exists.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Success {
        output: Value,
        metadata: StepMetadata,
    },
    Failed {
        error: StepError,
        metadata: StepMetadata,
    },
}

impl StepResult {
    pub fn success(output: Value, metadata: StepMetadata) -> Self {
        StepResult::Success { output, metadata }
    }

    pub fn failed(error: StepError, metadata: StepMetadata) -> Self {
        StepResult::Failed { error, metadata }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }

    pub fn metadata(&self) -> &StepMetadata {
        match self {
            StepResult::Success { metadata, .. } => metadata,
            StepResult::Failed { metadata, .. } => metadata,
        }
    }
}

/// The contract every step implementation fulfils.
///
/// Implementations are stateless between calls: the registry constructs a
/// fresh instance for every attempt.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, input: &Value, ctx: &ExecutionContext) -> StepResult;
}

/// Maps a declarative step to a concrete executor with its configuration
/// attached.
pub trait StepRegistry: Send + Sync {
    fn create(&self, step: &Step) -> Box<dyn StepExecutor>;
}
