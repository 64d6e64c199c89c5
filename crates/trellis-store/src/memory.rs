//! In-process store backend.
//!
//! Keeps all records in memory behind a mutex. Used by the test suites
//! and by embedded deployments that do not need durability. Semantics
//! (immutability guards, orderings) match the Postgres backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use trellis_core::{
    ExecutionId, ExecutionStatus, LogEvent, Step, StepAttempt, Workflow, WorkflowExecution,
    WorkflowId,
};

use crate::port::ExecutionStore;
use crate::{Result, StoreError};

#[derive(Default)]
struct Inner {
    workflows: HashMap<WorkflowId, Workflow>,
    steps: HashMap<WorkflowId, Vec<Step>>,
    executions: HashMap<ExecutionId, WorkflowExecution>,
    /// Insertion order doubles as creation order.
    attempts: Vec<StepAttempt>,
    /// Insertion order is the tie-break for equal timestamps.
    logs: Vec<LogEvent>,
}

/// Shared-nothing in-memory implementation of [`ExecutionStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Recover from poisoning: a panicking writer must not take the
        // whole store down with it.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert_workflow(&self, workflow: &Workflow, steps: &[Step]) -> Result<()> {
        let mut ordered = steps.to_vec();
        ordered.sort_by_key(|s| s.order);
        for pair in ordered.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(StoreError::DuplicateStepOrder {
                    workflow_id: workflow.id.to_string(),
                    order: pair[0].order,
                });
            }
        }

        let mut inner = self.lock();
        inner.workflows.insert(workflow.id, workflow.clone());
        inner.steps.insert(workflow.id, ordered);
        Ok(())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        self.lock().executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
        log: Option<&LogEvent>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| StoreError::not_found("workflow_execution", execution.id.to_string()))?;

        let reopening = stored.status == ExecutionStatus::Failed
            && execution.status == ExecutionStatus::Running;
        if stored.status.is_terminal() && !reopening {
            return Err(StoreError::immutability_violation(
                "workflow_execution",
                execution.id.to_string(),
            ));
        }

        *stored = execution.clone();
        if let Some(event) = log {
            inner.logs.push(event.clone());
        }
        Ok(())
    }

    async fn insert_attempt(&self, attempt: &StepAttempt) -> Result<()> {
        self.lock().attempts.push(attempt.clone());
        Ok(())
    }

    async fn update_attempt(&self, attempt: &StepAttempt, log: Option<&LogEvent>) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt.id)
            .ok_or_else(|| StoreError::not_found("step_attempt", attempt.id.to_string()))?;

        if stored.status.is_terminal() {
            return Err(StoreError::immutability_violation(
                "step_attempt",
                attempt.id.to_string(),
            ));
        }

        *stored = attempt.clone();
        if let Some(event) = log {
            inner.logs.push(event.clone());
        }
        Ok(())
    }

    async fn append_log(&self, event: &LogEvent) -> Result<()> {
        self.lock().logs.push(event.clone());
        Ok(())
    }

    async fn fetch_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        self.lock()
            .workflows
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workflow", id.to_string()))
    }

    async fn fetch_execution(&self, id: ExecutionId) -> Result<WorkflowExecution> {
        self.lock()
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workflow_execution", id.to_string()))
    }

    async fn fetch_steps(&self, workflow_id: WorkflowId) -> Result<Vec<Step>> {
        Ok(self
            .lock()
            .steps
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_attempts(&self, execution_id: ExecutionId) -> Result<Vec<StepAttempt>> {
        Ok(self
            .lock()
            .attempts
            .iter()
            .filter(|a| a.workflow_execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn fetch_logs(&self, execution_id: ExecutionId) -> Result<Vec<LogEvent>> {
        let mut logs: Vec<LogEvent> = self
            .lock()
            .logs
            .iter()
            .filter(|l| l.workflow_execution_id == execution_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        logs.sort_by_key(|l| l.timestamp);
        Ok(logs)
    }
}
