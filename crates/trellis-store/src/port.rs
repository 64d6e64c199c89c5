//! The persistence port required by the execution core.
//!
//! History is append-only: executions, attempts, and log events are
//! inserted once; only the mutable fields of a non-terminal execution or
//! attempt may be updated, and every update that represents a state
//! transition commits together with its log event.

use async_trait::async_trait;
use trellis_core::{
    ExecutionId, LogEvent, Step, StepAttempt, Workflow, WorkflowExecution, WorkflowId,
};

use crate::Result;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Registers a workflow with its ordered steps. Rejects duplicate
    /// `order` values within the workflow.
    async fn insert_workflow(&self, workflow: &Workflow, steps: &[Step]) -> Result<()>;

    /// Appends a new workflow execution record.
    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<()>;

    /// Persists the mutable fields of a non-terminal execution, together
    /// with the log event for the transition. Refuses to touch a record
    /// that is already terminal, except the documented reopen of a failed
    /// execution from the resume entry point.
    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
        log: Option<&LogEvent>,
    ) -> Result<()>;

    /// Appends a new step attempt record.
    async fn insert_attempt(&self, attempt: &StepAttempt) -> Result<()>;

    /// Persists the mutable fields of a non-terminal attempt, together
    /// with the log event for the transition.
    async fn update_attempt(&self, attempt: &StepAttempt, log: Option<&LogEvent>) -> Result<()>;

    /// Appends a log event outside a state transition (e.g. RETRYING).
    async fn append_log(&self, event: &LogEvent) -> Result<()>;

    async fn fetch_workflow(&self, id: WorkflowId) -> Result<Workflow>;

    async fn fetch_execution(&self, id: ExecutionId) -> Result<WorkflowExecution>;

    /// Steps of a workflow, sorted strictly ascending by `order`.
    async fn fetch_steps(&self, workflow_id: WorkflowId) -> Result<Vec<Step>>;

    /// All attempts of an execution, in creation order.
    async fn fetch_attempts(&self, execution_id: ExecutionId) -> Result<Vec<StepAttempt>>;

    /// All log events of an execution, ordered by timestamp with
    /// insertion order as tie-break.
    async fn fetch_logs(&self, execution_id: ExecutionId) -> Result<Vec<LogEvent>>;
}
