//! Builders for workflow definitions used across the suites.

use trellis_core::{RetryConfig, Step, StepConfig, Workflow};
use trellis_store::{ExecutionStore, MemoryStore};

/// Builds a workflow and its ordered steps, then registers both.
pub struct WorkflowBuilder {
    workflow: Workflow,
    steps: Vec<Step>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(name, "integration-tests"),
            steps: Vec::new(),
        }
    }

    /// Appends a step with the next order number.
    pub fn with_step(mut self, config: StepConfig) -> Self {
        let order = self.steps.len() as u32 + 1;
        self.steps.push(Step::new(self.workflow.id, order, config));
        self
    }

    /// Applies a modifier to the most recently added step.
    pub fn tune_last(mut self, f: impl FnOnce(Step) -> Step) -> Self {
        let step = self.steps.pop().expect("no step to tune");
        self.steps.push(f(step));
        self
    }

    pub fn with_retry_on_last(self, max_retries: u32, backoff_seconds: u64) -> Self {
        self.tune_last(|s| s.with_retry(RetryConfig::new(max_retries, backoff_seconds)))
    }

    pub async fn register(self, store: &MemoryStore) -> (Workflow, Vec<Step>) {
        store
            .insert_workflow(&self.workflow, &self.steps)
            .await
            .expect("workflow registration failed");
        (self.workflow, self.steps)
    }
}
