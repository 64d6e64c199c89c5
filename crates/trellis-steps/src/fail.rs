//! Forced-failure step.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use trellis_core::{ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult};

/// Always fails with a permanent error. Used to exercise failure paths
/// and error propagation.
#[derive(Debug, Default)]
pub struct FailStep;

#[async_trait]
impl StepExecutor for FailStep {
    async fn execute(&self, _input: &Value, _ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();
        StepResult::failed(
            StepError::permanent(
                "FORCED_FAILURE",
                "This step is designed to fail for testing purposes",
            ),
            StepMetadata::capture(started_at),
        )
    }
}
