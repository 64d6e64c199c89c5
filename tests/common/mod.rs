//! Common test utilities
//!
//! Shared fixtures, workflow builders, and assertion helpers for the
//! integration suites.

use std::sync::Arc;

use trellis_core::{ExecutionId, LogEvent, Step, StepAttempt, StepConfig, Workflow};
use trellis_engine::{EngineConfig, LinearExecutor};
use trellis_steps::DefaultRegistry;
use trellis_store::MemoryStore;

pub use trellis_store::ExecutionStore;

pub mod assertions;
pub mod builders;

pub use assertions::*;
pub use builders::*;

/// An engine wired against an in-memory store and the default registry.
pub struct TestEngine {
    pub store: MemoryStore,
    pub executor: LinearExecutor,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let executor = LinearExecutor::with_config(
            Arc::new(store.clone()),
            Arc::new(DefaultRegistry),
            config,
        );
        Self { store, executor }
    }

    /// Registers a workflow with one step per config, ordered as given.
    pub async fn register(&self, name: &str, configs: Vec<StepConfig>) -> (Workflow, Vec<Step>) {
        let builder = configs
            .into_iter()
            .fold(WorkflowBuilder::new(name), |b, config| b.with_step(config));
        builder.register(&self.store).await
    }

    pub async fn attempts_for(&self, execution_id: ExecutionId) -> Vec<StepAttempt> {
        self.store.fetch_attempts(execution_id).await.unwrap()
    }

    pub async fn logs_for(&self, execution_id: ExecutionId) -> Vec<LogEvent> {
        self.store.fetch_logs(execution_id).await.unwrap()
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
