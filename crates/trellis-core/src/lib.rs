//! Trellis core: domain types, state machines, and the step contract.
//!
//! Everything here is persistence- and transport-agnostic. The store and
//! engine crates build on these types; step implementations only ever see
//! the contract module.

pub mod contract;
pub mod error;
pub mod execution;
pub mod ids;
pub mod log;
pub mod workflow;

pub use contract::{
    ExecutionContext, StepError, StepExecutor, StepMetadata, StepRegistry, StepResult,
};
pub use error::{EngineError, Result};
pub use execution::{AttemptStatus, ErrorClass, ExecutionStatus, StepAttempt, WorkflowExecution};
pub use ids::{AttemptId, ExecutionId, LogEventId, StepId, WorkflowId};
pub use log::LogEvent;
pub use workflow::{
    AiConfig, ApiConfig, LogicConfig, RetryConfig, Step, StepConfig, StepKind, StorageConfig,
    Workflow,
};
