//! Lifecycle event logger.
//!
//! A thin façade over the LogEvent append stream: every lifecycle edge
//! emits exactly one durable event, mirrored to `tracing` for operators.
//! Workflow-level events carry `workflow_id`; step-level events carry
//! `step_type` and `retry_count`.

use serde_json::json;

use trellis_core::{ExecutionId, LogEvent, StepAttempt, StepError, StepKind, WorkflowExecution};

pub(crate) fn workflow_started(execution: &WorkflowExecution, workflow_name: &str) -> LogEvent {
    tracing::info!(
        execution_id = %execution.id,
        workflow = workflow_name,
        "Workflow execution started"
    );
    LogEvent::workflow(
        execution.id,
        format!("Workflow execution started: {workflow_name}"),
        json!({
            "workflow_id": execution.workflow_id.to_string(),
            "status": "RUNNING",
        }),
    )
}

pub(crate) fn workflow_succeeded(execution: &WorkflowExecution) -> LogEvent {
    tracing::info!(execution_id = %execution.id, "Workflow execution completed successfully");
    LogEvent::workflow(
        execution.id,
        "Workflow execution completed successfully",
        json!({
            "workflow_id": execution.workflow_id.to_string(),
            "status": "SUCCESS",
        }),
    )
}

pub(crate) fn workflow_failed(execution: &WorkflowExecution) -> LogEvent {
    tracing::warn!(execution_id = %execution.id, "Workflow execution failed");
    LogEvent::workflow(
        execution.id,
        "Workflow execution failed",
        json!({
            "workflow_id": execution.workflow_id.to_string(),
            "status": "FAILED",
        }),
    )
}

pub(crate) fn step_started(
    execution_id: ExecutionId,
    attempt: &StepAttempt,
    kind: StepKind,
) -> LogEvent {
    tracing::debug!(
        step_id = %attempt.step_id,
        retry_count = attempt.retry_count,
        "Step started"
    );
    let message = if attempt.is_retry {
        format!("Step started: {kind} (Retry {})", attempt.retry_count)
    } else {
        format!("Step started: {kind}")
    };
    LogEvent::step(
        execution_id,
        attempt.id,
        message,
        json!({
            "step_type": kind.as_str(),
            "status": "RUNNING",
            "retry_count": attempt.retry_count,
        }),
    )
}

pub(crate) fn step_succeeded(
    execution_id: ExecutionId,
    attempt: &StepAttempt,
    kind: StepKind,
) -> LogEvent {
    tracing::debug!(step_id = %attempt.step_id, "Step completed successfully");
    LogEvent::step(
        execution_id,
        attempt.id,
        format!("Step completed successfully: {kind}"),
        json!({
            "step_type": kind.as_str(),
            "status": "SUCCESS",
            "retry_count": attempt.retry_count,
        }),
    )
}

pub(crate) fn step_failed(
    execution_id: ExecutionId,
    attempt: &StepAttempt,
    kind: StepKind,
    error: &StepError,
) -> LogEvent {
    tracing::warn!(
        step_id = %attempt.step_id,
        error = %error.summary(),
        retry_count = attempt.retry_count,
        "Step failed"
    );
    LogEvent::step(
        execution_id,
        attempt.id,
        format!("Step failed: {kind}"),
        json!({
            "step_type": kind.as_str(),
            "status": "FAILED",
            "error": error.summary(),
            "retry_count": attempt.retry_count,
        }),
    )
}

pub(crate) fn step_retrying(
    execution_id: ExecutionId,
    attempt: &StepAttempt,
    kind: StepKind,
    backoff_seconds: u64,
) -> LogEvent {
    let next_retry = attempt.retry_count + 1;
    tracing::info!(
        step_id = %attempt.step_id,
        backoff_seconds,
        next_retry,
        "Retrying step"
    );
    LogEvent::step(
        execution_id,
        attempt.id,
        format!("Retrying step after {backoff_seconds}s backoff (attempt {next_retry})"),
        json!({
            "step_type": kind.as_str(),
            "status": "RETRYING",
            "backoff_seconds": backoff_seconds,
            "next_retry": next_retry,
        }),
    )
}
