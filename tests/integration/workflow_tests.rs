//! End-to-end workflow execution
//!
//! Covers the happy path, halt-on-first-failure, and the universal
//! history invariants: gap-free attempt prefixes, timestamp ordering,
//! and the audit-trail shape.

use pretty_assertions::assert_eq;
use serde_json::json;
use trellis_core::{
    AttemptStatus, ExecutionStatus, LogicConfig, StepConfig, StorageConfig,
};
use trellis_tests::*;

fn linear_configs() -> Vec<StepConfig> {
    vec![
        StepConfig::Manual,
        StepConfig::Logic(LogicConfig::default()),
        StepConfig::Storage(StorageConfig::default()),
    ]
}

#[tokio::test]
async fn test_happy_path_three_steps() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, steps) = engine.register("happy-path", linear_configs()).await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({"user_id": "123"}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.workflow_version, workflow.version);
    assert_eq!(execution.trigger_source, "manual");

    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.status == AttemptStatus::Success));
    assert_attempt_invariants(&attempts);

    // The pass-through step hands the trigger input on unchanged.
    assert_eq!(attempts[0].input, Some(json!({"user_id": "123"})));
    assert_eq!(attempts[0].output, Some(json!({"user_id": "123"})));

    // The transform stamps its processing evidence.
    let transform_output = attempts[1].output.as_ref().unwrap();
    assert_eq!(transform_output["user_id"], json!("123"));
    assert_eq!(transform_output["processed"], json!(true));

    // Step 3 receives exactly what step 2 produced.
    assert_eq!(attempts[2].input.as_ref(), Some(transform_output));
    assert_eq!(attempts[2].output.as_ref().unwrap()["persisted"], json!(false));

    // Attempts cover the step prefix in declaration order.
    let attempted: Vec<_> = attempts.iter().map(|a| a.step_id).collect();
    let declared: Vec<_> = steps.iter().map(|s| s.id).collect();
    assert_eq!(attempted, declared);
}

#[tokio::test]
async fn test_happy_path_emits_eight_log_events() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine.register("happy-logs", linear_configs()).await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({"user_id": "123"}), "manual")
        .await
        .unwrap();

    // Assert
    let logs = engine.logs_for(execution.id).await;
    assert_log_messages(
        &logs,
        &[
            "Workflow execution started",
            "Step started: manual",
            "Step completed successfully: manual",
            "Step started: logic",
            "Step completed successfully: logic",
            "Step started: storage",
            "Step completed successfully: storage",
            "Workflow execution completed successfully",
        ],
    );
    assert_logs_monotonic(&logs);

    // Workflow-level events carry no attempt reference; step events do.
    assert!(logs[0].is_workflow_level());
    assert!(logs[7].is_workflow_level());
    assert!(logs[1..7].iter().all(|l| !l.is_workflow_level()));

    let started_count = logs
        .iter()
        .filter(|l| l.message.starts_with("Workflow execution started"))
        .count();
    assert_eq!(started_count, 1);
}

#[tokio::test]
async fn test_forced_failure_halts_execution() {
    // Arrange: MANUAL → API force-fail → STORAGE
    let engine = TestEngine::new();
    let (workflow, steps) = engine
        .register(
            "halt-on-failure",
            vec![
                StepConfig::Manual,
                StepConfig::Api(trellis_core::ApiConfig {
                    handler: Some("force_fail".to_string()),
                    ..Default::default()
                }),
                StepConfig::Storage(StorageConfig::default()),
            ],
        )
        .await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({"user_id": "123"}), "manual")
        .await
        .unwrap();

    // Assert
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts.len(), 2, "storage step must not produce an attempt");
    assert_eq!(attempts[0].status, AttemptStatus::Success);
    assert_eq!(attempts[1].status, AttemptStatus::Failed);
    assert!(attempts[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("FORCED_FAILURE: "));
    assert_eq!(
        attempts[1].error_class,
        Some(trellis_core::ErrorClass::Permanent)
    );

    // No gap and no attempt for the step after the failure.
    let storage_step = &steps[2];
    assert!(attempts.iter().all(|a| a.step_id != storage_step.id));

    let logs = engine.logs_for(execution.id).await;
    assert_eq!(
        logs.last().unwrap().message,
        "Workflow execution failed"
    );
}

#[tokio::test]
async fn test_scalar_trigger_input_is_wrapped_in_snapshot() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine.register("scalar-input", vec![StepConfig::Manual]).await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!("plain-string"), "manual")
        .await
        .unwrap();

    // Assert: the attempt snapshot is an object even for scalar inputs,
    // while the step itself received the raw value.
    let attempts = engine.attempts_for(execution.id).await;
    assert_eq!(attempts[0].input, Some(json!({"value": "plain-string"})));
    assert_eq!(attempts[0].output, Some(json!("plain-string")));
}

#[tokio::test]
async fn test_execution_timestamps_are_ordered() {
    // Arrange
    let engine = TestEngine::new();
    let (workflow, _) = engine.register("timestamps", linear_configs()).await;

    // Act
    let execution = engine
        .executor
        .execute(&workflow, json!({}), "manual")
        .await
        .unwrap();

    // Assert
    let started_at = execution.started_at.unwrap();
    let finished_at = execution.finished_at.unwrap();
    assert!(execution.created_at <= started_at);
    assert!(started_at <= finished_at);

    assert_attempt_invariants(&engine.attempts_for(execution.id).await);
}

#[tokio::test]
async fn test_trigger_source_is_recorded() {
    let engine = TestEngine::new();
    let (workflow, _) = engine.register("source", vec![StepConfig::Manual]).await;

    let execution = engine
        .executor
        .execute(&workflow, json!({}), "schedule")
        .await
        .unwrap();

    assert_eq!(execution.trigger_source, "schedule");
}

#[tokio::test]
async fn test_concurrent_executions_do_not_interfere() {
    // Two executions of the same workflow run on separate tasks against
    // one shared store; their histories stay disjoint.
    let engine = std::sync::Arc::new(TestEngine::new());
    let (workflow, _) = engine.register("concurrent", linear_configs()).await;

    let first = {
        let engine = engine.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move {
            engine
                .executor
                .execute(&workflow, json!({"run": 1}), "manual")
                .await
                .unwrap()
        })
    };
    let second = {
        let engine = engine.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move {
            engine
                .executor
                .execute(&workflow, json!({"run": 2}), "manual")
                .await
                .unwrap()
        })
    };

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(first.status, ExecutionStatus::Success);
    assert_eq!(second.status, ExecutionStatus::Success);
    assert_ne!(first.id, second.id);

    assert_eq!(engine.attempts_for(first.id).await.len(), 3);
    assert_eq!(engine.attempts_for(second.id).await.len(), 3);
    assert_eq!(engine.logs_for(first.id).await.len(), 8);
    assert_eq!(engine.logs_for(second.id).await.len(), 8);
}
