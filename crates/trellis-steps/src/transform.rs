//! Default logic transformation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use trellis_core::{ExecutionContext, LogicConfig, StepExecutor, StepMetadata, StepResult};

/// Pure transformation: stamps the input with processing metadata.
/// Non-object inputs are wrapped under `original_input` so the output is
/// always an object.
///
/// `sleep_secs` delays the transform; deployments use it to exercise the
/// timeout harness against a real step.
#[derive(Debug, Default)]
pub struct TransformStep {
    config: LogicConfig,
}

impl TransformStep {
    pub fn new(config: LogicConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StepExecutor for TransformStep {
    async fn execute(&self, input: &Value, ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        if let Some(secs) = self.config.sleep_secs {
            tracing::debug!(sleep_secs = secs, "Transform step sleeping");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }

        let mut output = match input {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("original_input".to_string(), other.clone());
                map
            }
        };
        output.insert("processed".to_string(), json!(true));
        output.insert("processed_at".to_string(), json!(started_at.to_rfc3339()));
        output.insert(
            "workflow_execution_id".to_string(),
            json!(ctx.workflow_execution_id.to_string()),
        );

        StepResult::success(Value::Object(output), StepMetadata::capture(started_at))
    }
}
