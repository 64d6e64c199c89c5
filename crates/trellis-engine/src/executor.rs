//! The linear executor.
//!
//! Drives one workflow attempt end to end: opens the execution record,
//! walks the ordered steps, runs each attempt under validation and the
//! timeout harness, applies the retry policy, and settles the workflow
//! outcome from the effective attempt of every step. A separate resume
//! entry point retries a specific failed attempt and continues with the
//! remaining steps.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use trellis_core::{
    AttemptId, AttemptStatus, EngineError, ExecutionContext, ExecutionId, ExecutionStatus,
    Result, Step, StepAttempt, StepId, StepMetadata, StepRegistry, StepResult, Workflow,
    WorkflowExecution,
};
use trellis_store::ExecutionStore;

use crate::config::EngineConfig;
use crate::{harness, logger, retry, validator};

/// Wraps non-object values so attempt input snapshots are always objects.
fn snapshot(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        other => serde_json::json!({ "value": other }),
    }
}

enum ChainOutcome {
    /// The chain ended in success with this output.
    Completed(Value),
    /// The chain ended in failure; later steps must not run.
    Halted,
}

/// Executes workflows strictly sequentially against a persistence store
/// and a step registry.
pub struct LinearExecutor {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<dyn StepRegistry>,
    config: EngineConfig,
}

impl LinearExecutor {
    pub fn new(store: Arc<dyn ExecutionStore>, registry: Arc<dyn StepRegistry>) -> Self {
        Self::with_config(store, registry, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ExecutionStore>,
        registry: Arc<dyn StepRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Runs one workflow attempt to a terminal state and returns the
    /// settled execution record.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        trigger_input: Value,
        trigger_source: &str,
    ) -> Result<WorkflowExecution> {
        let mut execution =
            WorkflowExecution::new(workflow.id, workflow.version, trigger_source);
        self.store.insert_execution(&execution).await?;

        execution.transition_to(ExecutionStatus::Running)?;
        let started = logger::workflow_started(&execution, &workflow.name);
        self.store.update_execution(&execution, Some(&started)).await?;

        let mut steps = self.store.fetch_steps(workflow.id).await?;
        steps.sort_by_key(|s| s.order);

        self.run_steps(&execution, &steps, &trigger_input, trigger_input.clone())
            .await?;

        self.complete_workflow(&mut execution).await?;
        Ok(execution)
    }

    /// Manually retries a failed attempt, then continues with the
    /// remaining steps if the retry succeeds.
    ///
    /// The retried attempt runs once under the normal contract
    /// (validation and timeout) but without automatic retries: the
    /// operator initiated this attempt deliberately.
    pub async fn resume(
        &self,
        execution_id: ExecutionId,
        failed_attempt_id: AttemptId,
    ) -> Result<WorkflowExecution> {
        let mut execution = self.store.fetch_execution(execution_id).await?;

        if !execution.is_terminal() {
            return Err(EngineError::retry_not_allowed(
                "execution has not reached a terminal state",
            ));
        }
        if execution.status == ExecutionStatus::Cancelled {
            return Err(EngineError::retry_not_allowed("execution was cancelled"));
        }

        let attempts = self.store.fetch_attempts(execution_id).await?;
        let failed = attempts
            .iter()
            .find(|a| a.id == failed_attempt_id)
            .ok_or_else(|| {
                EngineError::not_found("step_attempt", failed_attempt_id.to_string())
            })?;

        if failed.status != AttemptStatus::Failed {
            return Err(EngineError::retry_not_allowed(
                "attempt is not in a failed state",
            ));
        }
        if attempts
            .iter()
            .any(|a| a.step_id == failed.step_id && a.retry_count > failed.retry_count)
        {
            return Err(EngineError::retry_not_allowed(
                "a newer attempt already exists for this step",
            ));
        }

        let mut steps = self.store.fetch_steps(execution.workflow_id).await?;
        steps.sort_by_key(|s| s.order);
        let step = steps
            .iter()
            .find(|s| s.id == failed.step_id)
            .ok_or_else(|| {
                EngineError::retry_not_allowed("attempt does not belong to this execution")
            })?;

        info!(
            execution_id = %execution_id,
            attempt_id = %failed_attempt_id,
            "Resuming execution from failed attempt"
        );

        // The sanctioned reopen: a failed workflow goes back to RUNNING
        // for the duration of the manual retry.
        if execution.status == ExecutionStatus::Failed {
            execution.reopen()?;
            self.store.update_execution(&execution, None).await?;
        }

        let resume_input = failed.input.clone().unwrap_or(Value::Null);
        let mut attempt = StepAttempt::retry_of(failed);
        self.store.insert_attempt(&attempt).await?;

        let output = self
            .run_single_attempt(execution.id, step, &resume_input, &resume_input, &mut attempt)
            .await?;

        if let Some(output) = output {
            let remaining: Vec<Step> = steps
                .iter()
                .filter(|s| s.order > step.order)
                .cloned()
                .collect();
            self.run_steps(&execution, &remaining, &resume_input, output)
                .await?;
        }

        self.complete_workflow(&mut execution).await?;
        Ok(execution)
    }

    /// Runs `steps` in order, threading each output into the next input.
    /// Stops at the first step whose attempt chain ends in failure.
    async fn run_steps(
        &self,
        execution: &WorkflowExecution,
        steps: &[Step],
        trigger_input: &Value,
        mut current_input: Value,
    ) -> Result<()> {
        for step in steps {
            let attempt = StepAttempt::new(execution.id, step.id, snapshot(&current_input));
            self.store.insert_attempt(&attempt).await?;

            match self
                .run_step_chain(execution.id, step, trigger_input, &current_input, attempt)
                .await?
            {
                ChainOutcome::Completed(output) => current_input = output,
                ChainOutcome::Halted => break,
            }
        }
        Ok(())
    }

    /// Runs one step's attempt chain: execute, and while the retry policy
    /// says yes, back off and run a linked successor attempt with the same
    /// input.
    async fn run_step_chain(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        trigger_input: &Value,
        input: &Value,
        mut attempt: StepAttempt,
    ) -> Result<ChainOutcome> {
        loop {
            let output = self
                .run_single_attempt(execution_id, step, trigger_input, input, &mut attempt)
                .await?;

            if let Some(output) = output {
                return Ok(ChainOutcome::Completed(output));
            }

            if !retry::should_retry(step, &attempt) {
                return Ok(ChainOutcome::Halted);
            }

            let backoff = retry::backoff_seconds(step);
            let retrying = logger::step_retrying(execution_id, &attempt, step.kind(), backoff);
            self.store.append_log(&retrying).await?;
            tokio::time::sleep(Duration::from_secs(backoff)).await;

            let next = StepAttempt::retry_of(&attempt);
            self.store.insert_attempt(&next).await?;
            attempt = next;
        }
    }

    /// Runs exactly one attempt to its terminal state and commits it.
    /// Returns the output on success, `None` on failure.
    async fn run_single_attempt(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        trigger_input: &Value,
        input: &Value,
        attempt: &mut StepAttempt,
    ) -> Result<Option<Value>> {
        attempt.transition_to(AttemptStatus::Running)?;
        let started = logger::step_started(execution_id, attempt, step.kind());
        self.store.update_attempt(attempt, Some(&started)).await?;

        let result = self.run_contract(execution_id, step, trigger_input, input, attempt).await;

        match result {
            StepResult::Success { output, metadata } => {
                attempt.output = Some(output.clone());
                attempt.step_metadata = metadata.extra;
                attempt.transition_to(AttemptStatus::Success)?;
                let succeeded = logger::step_succeeded(execution_id, attempt, step.kind());
                self.store.update_attempt(attempt, Some(&succeeded)).await?;
                Ok(Some(output))
            }
            StepResult::Failed { error, metadata } => {
                attempt.error = Some(error.summary());
                attempt.error_class = Some(error.class);
                attempt.step_metadata = metadata.extra;
                attempt.transition_to(AttemptStatus::Failed)?;
                let failed = logger::step_failed(execution_id, attempt, step.kind(), &error);
                self.store.update_attempt(attempt, Some(&failed)).await?;
                Ok(None)
            }
        }
    }

    /// The step contract pipeline: input validation, instantiation,
    /// the timeout harness, output validation.
    async fn run_contract(
        &self,
        execution_id: ExecutionId,
        step: &Step,
        trigger_input: &Value,
        input: &Value,
        attempt: &StepAttempt,
    ) -> StepResult {
        if let Some(schema) = &step.input_schema {
            if let Some(error) = validator::check(schema, input, validator::Direction::Input) {
                // The step implementation is never invoked.
                return StepResult::failed(error, StepMetadata::capture(chrono::Utc::now()));
            }
        }

        let ctx = ExecutionContext {
            workflow_execution_id: execution_id,
            step_attempt_id: attempt.id,
            workflow_id: step.workflow_id,
            step_id: step.id,
            trigger_input: trigger_input.clone(),
            retry_count: attempt.retry_count,
        };

        let executor = self.registry.create(step);
        let deadline = self.config.step_deadline(step);
        let result = harness::run_step(executor, input, &ctx, deadline).await;

        if let StepResult::Success { output, metadata } = &result {
            if let Some(schema) = &step.output_schema {
                if let Some(error) =
                    validator::check(schema, output, validator::Direction::Output)
                {
                    // Rewritten to a failure; the step's own metadata is kept.
                    return StepResult::failed(error, metadata.clone());
                }
            }
        }

        result
    }

    /// Settles the workflow outcome from the effective attempt (highest
    /// retry count) of every step that ran.
    async fn complete_workflow(&self, execution: &mut WorkflowExecution) -> Result<()> {
        let attempts = self.store.fetch_attempts(execution.id).await?;

        let mut effective: HashMap<StepId, &StepAttempt> = HashMap::new();
        for attempt in &attempts {
            match effective.get(&attempt.step_id) {
                Some(current) if current.retry_count >= attempt.retry_count => {}
                _ => {
                    effective.insert(attempt.step_id, attempt);
                }
            }
        }

        let any_failed = effective
            .values()
            .any(|a| a.status == AttemptStatus::Failed);
        debug!(
            execution_id = %execution.id,
            steps_attempted = effective.len(),
            any_failed,
            "Completing workflow execution"
        );

        if any_failed {
            execution.transition_to(ExecutionStatus::Failed)?;
            let event = logger::workflow_failed(execution);
            self.store.update_execution(execution, Some(&event)).await?;
        } else {
            execution.transition_to(ExecutionStatus::Success)?;
            let event = logger::workflow_succeeded(execution);
            self.store.update_execution(execution, Some(&event)).await?;
        }
        Ok(())
    }
}
