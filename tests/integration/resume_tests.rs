//! Manual resume from a failed attempt
//!
//! An operator retries a specific failed attempt: the engine reopens the
//! failed execution, runs the retried attempt once, and on success
//! continues with the remaining steps.

use pretty_assertions::assert_eq;
use serde_json::json;
use trellis_core::{
    ApiConfig, AttemptId, AttemptStatus, EngineError, ExecutionStatus, StepConfig,
};
use trellis_tests::*;

/// Fails once with no retry budget, so the first run leaves the workflow
/// FAILED; the manual retry (retry_count 1) then succeeds.
fn fail_once_api() -> StepConfig {
    StepConfig::Api(ApiConfig {
        fail_count: Some(1),
        ..Default::default()
    })
}

fn force_fail_api() -> StepConfig {
    StepConfig::Api(ApiConfig {
        handler: Some("force_fail".to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_successful_resume_completes_remaining_steps() {
    // Arrange: MANUAL → flaky API → MANUAL. First run halts at step 2.
    let engine = TestEngine::new();
    let (workflow, steps) = engine
        .register(
            "resume-recovers",
            vec![StepConfig::Manual, fail_once_api(), StepConfig::Manual],
        )
        .await;

    let failed_execution = engine
        .executor
        .execute(&workflow, json!({"user_id": "123"}), "manual")
        .await
        .unwrap();
    assert_eq!(failed_execution.status, ExecutionStatus::Failed);

    let attempts = engine.attempts_for(failed_execution.id).await;
    assert_eq!(attempts.len(), 2, "step 3 must not have run yet");
    let failed_attempt = attempts
        .iter()
        .find(|a| a.status == AttemptStatus::Failed)
        .unwrap();

    // Act
    let resumed = engine
        .executor
        .resume(failed_execution.id, failed_attempt.id)
        .await
        .unwrap();

    // Assert
    assert_eq!(resumed.status, ExecutionStatus::Success);
    assert_eq!(resumed.id, failed_execution.id, "same execution record");

    let attempts = engine.attempts_for(resumed.id).await;
    assert_eq!(attempts.len(), 4);
    assert_attempt_invariants(&attempts);

    // The retried attempt is chained onto the failed one with the same input.
    let chain = chain_for(&attempts, steps[1].id);
    assert_eq!(chain.len(), 2);
    assert_chain_linked(&chain);
    assert_eq!(chain[1].status, AttemptStatus::Success);
    assert_eq!(chain[1].input, chain[0].input);

    // The remaining step ran with the retried attempt's output as input.
    let tail = chain_for(&attempts, steps[2].id);
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].status, AttemptStatus::Success);
    assert_eq!(tail[0].input, chain[1].output);
}

#[tokio::test]
async fn test_failed_resume_leaves_workflow_failed() {
    // Arrange: the step fails permanently, so the manual retry fails too.
    let engine = TestEngine::new();
    let (workflow, steps) = engine
        .register(
            "resume-fails-again",
            vec![force_fail_api(), StepConfig::Manual],
        )
        .await;

    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();
    let attempts = engine.attempts_for(execution.id).await;
    let failed_attempt = &attempts[0];

    // Act
    let resumed = engine
        .executor
        .resume(execution.id, failed_attempt.id)
        .await
        .unwrap();

    // Assert
    assert_eq!(resumed.status, ExecutionStatus::Failed);

    let attempts = engine.attempts_for(resumed.id).await;
    let chain = chain_for(&attempts, steps[0].id);
    assert_eq!(chain.len(), 2);
    assert!(chain.iter().all(|a| a.status == AttemptStatus::Failed));

    // The step after the failure still never ran.
    assert!(attempts.iter().all(|a| a.step_id != steps[1].id));
}

#[tokio::test]
async fn test_resume_rejects_non_terminal_execution() {
    // Arrange: an execution parked in RUNNING (crashed host scenario).
    let engine = TestEngine::new();
    let mut execution =
        trellis_core::WorkflowExecution::new(trellis_core::WorkflowId::new(), 1, "manual");
    engine.store.insert_execution(&execution).await.unwrap();
    execution
        .transition_to(ExecutionStatus::Running)
        .unwrap();
    engine
        .store
        .update_execution(&execution, None)
        .await
        .unwrap();

    // Act / Assert
    let err = engine
        .executor
        .resume(execution.id, AttemptId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RetryNotAllowed { .. }));
    assert!(err.is_retry_refusal());
}

#[tokio::test]
async fn test_resume_rejects_successful_attempt() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine
        .register("resume-success-attempt", vec![StepConfig::Manual, force_fail_api()])
        .await;
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    let attempts = engine.attempts_for(execution.id).await;
    let successful = attempts
        .iter()
        .find(|a| a.status == AttemptStatus::Success)
        .unwrap();

    // Act / Assert
    let err = engine
        .executor
        .resume(execution.id, successful.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RetryNotAllowed { .. }));
}

#[tokio::test]
async fn test_resume_rejects_superseded_attempt() {
    // Arrange: automatic retries already superseded the first attempt.
    let engine = TestEngine::new();
    let (workflow, _) = {
        let builder = WorkflowBuilder::new("resume-superseded")
            .with_step(StepConfig::Api(ApiConfig {
                fail_count: Some(5),
                ..Default::default()
            }))
            .with_retry_on_last(1, 0);
        builder.register(&engine.store).await
    };
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    let attempts = engine.attempts_for(execution.id).await;
    let first = attempts.iter().find(|a| a.retry_count == 0).unwrap();

    // Act / Assert
    let err = engine
        .executor
        .resume(execution.id, first.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RetryNotAllowed { .. }));
}

#[tokio::test]
async fn test_resume_rejects_unknown_attempt() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine
        .register("resume-unknown", vec![force_fail_api()])
        .await;
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Act / Assert
    let err = engine
        .executor
        .resume(execution.id, AttemptId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_resume_emits_retry_numbered_logs() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine
        .register("resume-logs", vec![fail_once_api()])
        .await;
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();
    let failed_attempt = engine.attempts_for(execution.id).await[0].clone();

    // Act
    let resumed = engine
        .executor
        .resume(execution.id, failed_attempt.id)
        .await
        .unwrap();

    // Assert: the history reads first run, failure, manual retry, success.
    assert_eq!(resumed.status, ExecutionStatus::Success);
    let logs = engine.logs_for(resumed.id).await;
    assert_log_messages(
        &logs,
        &[
            "Workflow execution started",
            "Step started: api",
            "Step failed: api",
            "Workflow execution failed",
            "Step started: api (Retry 1)",
            "Step completed successfully: api",
            "Workflow execution completed successfully",
        ],
    );
    assert_logs_monotonic(&logs);

    // Still exactly one "started" event across the whole history.
    let started_count = logs
        .iter()
        .filter(|l| l.message.starts_with("Workflow execution started"))
        .count();
    assert_eq!(started_count, 1);
}
