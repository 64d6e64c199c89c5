//! Execution records and their state machines.
//!
//! A workflow execution and a step attempt are immutable history: once a
//! record reaches a terminal status no field may change again. The two
//! state machines differ only in their terminal states, and both set the
//! lifecycle timestamps as a side effect of transitioning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::EngineError;
use crate::ids::{AttemptId, ExecutionId, StepId, WorkflowId};

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        match self {
            ExecutionStatus::Pending => target == ExecutionStatus::Running,
            ExecutionStatus::Running => matches!(
                target,
                ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Lifecycle status of a step attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Success | AttemptStatus::Failed | AttemptStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Running => "running",
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Skipped => "skipped",
        }
    }

    fn can_transition_to(&self, target: AttemptStatus) -> bool {
        match self {
            AttemptStatus::Pending => target == AttemptStatus::Running,
            AttemptStatus::Running => matches!(
                target,
                AttemptStatus::Success | AttemptStatus::Failed | AttemptStatus::Skipped
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "running" => Ok(AttemptStatus::Running),
            "success" => Ok(AttemptStatus::Success),
            "failed" => Ok(AttemptStatus::Failed),
            "skipped" => Ok(AttemptStatus::Skipped),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Classification of a step failure. The retry policy keys off this, not
/// off any step-reported boolean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(ErrorClass::Transient),
            "permanent" => Ok(ErrorClass::Permanent),
            other => Err(format!("unknown error class: {other}")),
        }
    }
}

/// A single attempt to run a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub workflow_version: i32,
    pub status: ExecutionStatus,
    pub trigger_source: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_id: WorkflowId,
        workflow_version: i32,
        trigger_source: impl Into<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            workflow_version,
            status: ExecutionStatus::Pending,
            trigger_source: trigger_source.into(),
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transitions to `target`, enforcing the transition table and
    /// setting lifecycle timestamps.
    pub fn transition_to(&mut self, target: ExecutionStatus) -> Result<(), EngineError> {
        if self.is_terminal() || !self.status.can_transition_to(target) {
            return Err(EngineError::invalid_transition(
                "workflow_execution",
                self.status.as_str(),
                target.as_str(),
            ));
        }

        self.status = target;
        if target == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if target.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// The one sanctioned exception to terminal immutability: a manual
    /// retry reopens a FAILED execution so the remaining steps can run.
    /// Only the resume entry point may call this.
    pub fn reopen(&mut self) -> Result<(), EngineError> {
        if self.status != ExecutionStatus::Failed {
            return Err(EngineError::invalid_transition(
                "workflow_execution",
                self.status.as_str(),
                ExecutionStatus::Running.as_str(),
            ));
        }
        self.status = ExecutionStatus::Running;
        self.finished_at = None;
        Ok(())
    }
}

/// A single attempt at a single step inside a workflow execution.
///
/// Retries never mutate a failed attempt; they append a new one linked to
/// its predecessor, forming a chain ordered by `retry_count`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepAttempt {
    pub id: AttemptId,
    pub workflow_execution_id: ExecutionId,
    pub step_id: StepId,
    pub status: AttemptStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    /// Persisted as `"{code}: {message}"`.
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub retry_count: u32,
    pub is_retry: bool,
    pub parent_attempt_id: Option<AttemptId>,
    /// Free-form executor metadata, e.g. AI provider/model/prompt id.
    pub step_metadata: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StepAttempt {
    /// First attempt at a step, with the input snapshot it will receive.
    pub fn new(workflow_execution_id: ExecutionId, step_id: StepId, input: Value) -> Self {
        Self {
            id: AttemptId::new(),
            workflow_execution_id,
            step_id,
            status: AttemptStatus::Pending,
            input: Some(input),
            output: None,
            error: None,
            error_class: None,
            retry_count: 0,
            is_retry: false,
            parent_attempt_id: None,
            step_metadata: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    /// Successor attempt in a retry chain. Receives the same input
    /// snapshot as its parent; the input is never recomputed upstream.
    pub fn retry_of(parent: &StepAttempt) -> Self {
        Self {
            id: AttemptId::new(),
            workflow_execution_id: parent.workflow_execution_id,
            step_id: parent.step_id,
            status: AttemptStatus::Pending,
            input: parent.input.clone(),
            output: None,
            error: None,
            error_class: None,
            retry_count: parent.retry_count + 1,
            is_retry: true,
            parent_attempt_id: Some(parent.id),
            step_metadata: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn transition_to(&mut self, target: AttemptStatus) -> Result<(), EngineError> {
        if self.is_terminal() || !self.status.can_transition_to(target) {
            return Err(EngineError::invalid_transition(
                "step_attempt",
                self.status.as_str(),
                target.as_str(),
            ));
        }

        self.status = target;
        if target == AttemptStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if target.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}
