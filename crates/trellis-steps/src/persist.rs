//! Storage step with real side effects.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

use trellis_core::{ExecutionContext, StepExecutor, StepMetadata, StepResult, StorageConfig};

/// Appends one line per execution to the configured file. With no path
/// configured it degrades to a no-op that still reports success, so
/// side-effect-free workflows can exercise the storage contract.
#[derive(Debug, Default)]
pub struct PersistStep {
    config: StorageConfig,
}

impl PersistStep {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn append_line(path: &str, content: &str) -> std::io::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{content}")
    }
}

#[async_trait]
impl StepExecutor for PersistStep {
    async fn execute(&self, input: &Value, ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        let mut persisted = false;
        if let Some(path) = &self.config.path {
            let content = match input {
                Value::Object(map) => map
                    .get("log_line")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| input.to_string()),
                other => other.to_string(),
            };

            match Self::append_line(path, &content) {
                Ok(()) => persisted = true,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to persist step output");
                }
            }
        }

        let record_count = if input.is_null() { 0 } else { 1 };
        let output = json!({
            "persisted": persisted,
            "persisted_at": started_at.to_rfc3339(),
            "step_attempt_id": ctx.step_attempt_id.to_string(),
            "record_count": record_count,
            "path": self.config.path,
        });

        StepResult::success(output, StepMetadata::capture(started_at))
    }
}
