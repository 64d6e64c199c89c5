//! Pass-through step for manual input.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use trellis_core::{ExecutionContext, StepExecutor, StepMetadata, StepResult};

/// Returns its input unchanged. Represents manual user input or data that
/// flows through the workflow untouched.
#[derive(Debug, Default)]
pub struct PassthroughStep;

#[async_trait]
impl StepExecutor for PassthroughStep {
    async fn execute(&self, input: &Value, _ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();
        StepResult::success(input.clone(), StepMetadata::capture(started_at))
    }
}
