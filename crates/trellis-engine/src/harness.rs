//! Timeout and crash containment around step calls.
//!
//! The harness guarantees that a result or a `TIMEOUT` arrives within the
//! deadline plus scheduling slack, and that no panic escapes the step
//! contract: a panicking step materializes as a permanent `STEP_CRASH`
//! result instead of corrupting execution history.

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use trellis_core::{ExecutionContext, StepError, StepExecutor, StepMetadata, StepResult};

pub const TIMEOUT: &str = "TIMEOUT";
pub const STEP_CRASH: &str = "STEP_CRASH";

/// Runs one step call under a wall-clock deadline.
pub async fn run_step(
    executor: Box<dyn StepExecutor>,
    input: &Value,
    ctx: &ExecutionContext,
    deadline: Duration,
) -> StepResult {
    let started_at = Utc::now();
    let call = AssertUnwindSafe(executor.execute(input, ctx)).catch_unwind();

    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic_message(panic);
            tracing::error!(
                step_id = %ctx.step_id,
                panic = %message,
                "Step implementation panicked"
            );
            StepResult::failed(
                StepError::permanent(STEP_CRASH, format!("step panicked: {message}")),
                StepMetadata::capture(started_at),
            )
        }
        Err(_) => {
            tracing::warn!(
                step_id = %ctx.step_id,
                deadline_secs = deadline.as_secs(),
                "Step exceeded its deadline"
            );
            StepResult::failed(
                StepError::transient(
                    TIMEOUT,
                    format!("step timed out after {} seconds", deadline.as_secs()),
                ),
                StepMetadata::capture(started_at),
            )
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
