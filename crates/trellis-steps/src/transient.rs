//! Transient-failure step.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use trellis_core::{ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult};

const DEFAULT_FAIL_COUNT: u32 = 2;

/// Fails with a transient error for the first `fail_count` attempts of a
/// chain, then succeeds. The decision is derived from the durable
/// `retry_count` in the context, never from instance state: the registry
/// constructs a fresh instance per attempt, so instance counters would
/// reset on every attempt.
#[derive(Debug)]
pub struct TransientFailStep {
    fail_count: u32,
}

impl TransientFailStep {
    pub fn new(fail_count: u32) -> Self {
        Self { fail_count }
    }
}

impl Default for TransientFailStep {
    fn default() -> Self {
        Self::new(DEFAULT_FAIL_COUNT)
    }
}

#[async_trait]
impl StepExecutor for TransientFailStep {
    async fn execute(&self, input: &Value, ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();
        let attempt_number = ctx.retry_count + 1;

        if ctx.retry_count < self.fail_count {
            let input_summary: String = input.to_string().chars().take(100).collect();
            let message = format!(
                "Transient failure (attempt {}/{}). Step ID: {}, Workflow Execution ID: {}, Input: {}",
                attempt_number,
                self.fail_count + 1,
                ctx.step_id,
                ctx.workflow_execution_id,
                input_summary
            );

            return StepResult::failed(
                StepError::transient("TRANSIENT_FAILURE", message),
                StepMetadata::capture(started_at),
            );
        }

        let output = json!({
            "result": "success",
            "attempts": attempt_number,
            "message": format!("Succeeded after {} transient failures", self.fail_count),
        });
        StepResult::success(output, StepMetadata::capture(started_at))
    }
}
