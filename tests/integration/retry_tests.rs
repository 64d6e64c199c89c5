//! Retry behavior
//!
//! Transient failures with a retry budget produce linked attempt chains;
//! exhaustion fails the workflow; the effective attempt decides the
//! outcome.

use pretty_assertions::assert_eq;
use serde_json::json;
use trellis_core::{ApiConfig, AttemptStatus, ExecutionStatus, StepConfig};
use trellis_tests::*;

fn transient_api(fail_count: u32) -> StepConfig {
    StepConfig::Api(ApiConfig {
        fail_count: Some(fail_count),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_retry_eventually_succeeds() {
    // Arrange: MANUAL → API that fails twice then succeeds, budget 2.
    let engine = TestEngine::new();
    let (workflow, steps) = {
        let builder = WorkflowBuilder::new("retry-recovers")
            .with_step(StepConfig::Manual)
            .with_step(transient_api(2))
            .with_retry_on_last(2, 0);
        builder.register(&engine.store).await
    };

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({"user_id": "123"}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Success);

    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts.len(), 4);
    assert_attempt_invariants(&attempts);

    let chain = chain_for(&attempts, steps[1].id);
    assert_eq!(chain.len(), 3);
    assert_chain_linked(&chain);
    assert_eq!(
        chain.iter().map(|a| a.status).collect::<Vec<_>>(),
        vec![
            AttemptStatus::Failed,
            AttemptStatus::Failed,
            AttemptStatus::Success
        ]
    );

    // Retry attempts re-receive the exact same input snapshot.
    assert_eq!(chain[1].input, chain[0].input);
    assert_eq!(chain[2].input, chain[0].input);

    let effective = effective_attempts(&attempts);
    assert_eq!(effective[&steps[1].id].status, AttemptStatus::Success);
}

#[tokio::test]
async fn test_retry_exhaustion_fails_workflow() {
    // Arrange: the API step needs 5 failures to pass but only has budget 1.
    let engine = TestEngine::new();
    let (workflow, steps) = {
        let builder = WorkflowBuilder::new("retry-exhausted")
            .with_step(StepConfig::Manual)
            .with_step(transient_api(5))
            .with_retry_on_last(1, 0);
        builder.register(&engine.store).await
    };

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts.len(), 3);

    let chain = chain_for(&attempts, steps[1].id);
    assert_eq!(chain.len(), 2, "at most max_retries + 1 attempts");
    assert_chain_linked(&chain);
    assert!(chain.iter().all(|a| a.status == AttemptStatus::Failed));

    let effective = effective_attempts(&attempts);
    assert_eq!(effective[&steps[1].id].status, AttemptStatus::Failed);
}

#[tokio::test]
async fn test_permanent_failure_ignores_retry_budget() {
    // Arrange: forced failure is permanent; retry config must not apply.
    let engine = TestEngine::new();
    let (workflow, _) = {
        let builder = WorkflowBuilder::new("permanent-no-retry")
            .with_step(StepConfig::Api(ApiConfig {
                handler: Some("force_fail".to_string()),
                ..Default::default()
            }))
            .with_retry_on_last(3, 0);
        builder.register(&engine.store).await
    };

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts.len(), 1, "permanent errors never retry");
}

#[tokio::test]
async fn test_retry_log_trail() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = {
        let builder = WorkflowBuilder::new("retry-logs")
            .with_step(transient_api(1))
            .with_retry_on_last(1, 0);
        builder.register(&engine.store).await
    };

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Assert: failure, retry notice, then the numbered retry attempt.
    assert_eq!(execution.status, ExecutionStatus::Success);
    let logs = engine.logs_for(execution.id).await;
    assert_log_messages(
        &logs,
        &[
            "Workflow execution started",
            "Step started: api",
            "Step failed: api",
            "Retrying step after 0s backoff (attempt 1)",
            "Step started: api (Retry 1)",
            "Step completed successfully: api",
            "Workflow execution completed successfully",
        ],
    );

    let retrying = &logs[3];
    assert_eq!(retrying.metadata["status"], json!("RETRYING"));
    assert_eq!(retrying.metadata["backoff_seconds"], json!(0));
    assert_eq!(retrying.metadata["next_retry"], json!(1));

    let failed = &logs[2];
    assert_eq!(failed.metadata["status"], json!("FAILED"));
    assert!(failed.metadata["error"]
        .as_str()
        .unwrap()
        .starts_with("TRANSIENT_FAILURE: "));
}

#[tokio::test]
async fn test_no_retry_config_means_single_attempt() {
    // Arrange: a transient failure with no retry config on the step.
    let engine = TestEngine::new();
    let (workflow, _) = engine
        .register("no-retry-config", vec![transient_api(1)])
        .await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(engine.attempts_for(execution.id).await.len(), 1);
}
