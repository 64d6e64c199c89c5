//! Weather formatter logic handler.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use trellis_core::{ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult};

/// Formats a wttr.in `format=j1` payload into a human-readable log line,
/// suitable for a downstream storage step.
#[derive(Debug, Default)]
pub struct WeatherFormatStep;

fn extract(input: &Value) -> Option<String> {
    let current = input.get("current_condition")?.get(0)?;
    let temp = current
        .get("temp_C")
        .and_then(Value::as_str)
        .unwrap_or("?");
    let desc = current
        .get("weatherDesc")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("value"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let humidity = current
        .get("humidity")
        .and_then(Value::as_str)
        .unwrap_or("?");
    let area = input
        .get("nearest_area")
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("areaName"))
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("value"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown Location");

    Some(format!(
        "[{}] Weather in {}: {}°C, {}, Humidity: {}%",
        Utc::now().to_rfc3339(),
        area,
        temp,
        desc,
        humidity
    ))
}

#[async_trait]
impl StepExecutor for WeatherFormatStep {
    async fn execute(&self, input: &Value, _ctx: &ExecutionContext) -> StepResult {
        let started_at = Utc::now();

        match extract(input) {
            Some(log_line) => StepResult::success(
                json!({"log_line": log_line, "processed": true}),
                StepMetadata::capture(started_at),
            ),
            None => StepResult::failed(
                StepError::permanent("TRANSFORM_ERROR", "failed to parse weather data"),
                StepMetadata::capture(started_at),
            ),
        }
    }
}
