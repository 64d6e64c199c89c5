//! Workflow and step declarations.
//!
//! A workflow is a static, versioned definition of ordered steps. Steps are
//! declarative: their configuration is a discriminated union interpreted by
//! the step registry, never by the executor itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::ids::{StepId, WorkflowId};

/// Kind of a step. Determines which executor family handles it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Manual,
    Ai,
    Api,
    Logic,
    Storage,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Manual => "manual",
            StepKind::Ai => "ai",
            StepKind::Api => "api",
            StepKind::Logic => "logic",
            StepKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a logic step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogicConfig {
    /// Which logic handler to run. Unknown handlers fall back to the
    /// default transform.
    #[serde(default)]
    pub handler: Option<String>,
    /// Artificial delay applied by the default transform. Exists so
    /// deployments can exercise the timeout harness end to end.
    #[serde(default)]
    pub sleep_secs: Option<u64>,
}

/// Configuration for a storage step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub handler: Option<String>,
    /// When set, the step appends one line per execution to this file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Configuration for an API step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-request timeout, separate from the step's wall-clock deadline.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Send the step input as the JSON request body.
    #[serde(default)]
    pub body_from_input: bool,
    /// Merge headers from the input's `_headers` key.
    #[serde(default)]
    pub headers_from_input: bool,
    /// Used by the transient-failure fallback: how many attempts fail
    /// before one succeeds.
    #[serde(default)]
    pub fail_count: Option<u32>,
}

/// Configuration for an AI step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Static prompt. Takes precedence over `prompt_template`.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Template rendered against the (object) step input.
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub prompt_version: Option<String>,
    /// Guardrail: minimum acceptable output length.
    #[serde(default)]
    pub min_text_length: Option<usize>,
    /// Guardrail: phrases that must not appear in the output.
    #[serde(default)]
    pub forbidden_phrases: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Declarative step configuration: a discriminated union with one config
/// record per step kind. The step registry is the only component that
/// interprets this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    Manual,
    Logic(LogicConfig),
    Storage(StorageConfig),
    Api(ApiConfig),
    Ai(AiConfig),
}

impl StepConfig {
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::Manual => StepKind::Manual,
            StepConfig::Logic(_) => StepKind::Logic,
            StepConfig::Storage(_) => StepKind::Storage,
            StepConfig::Api(_) => StepKind::Api,
            StepConfig::Ai(_) => StepKind::Ai,
        }
    }
}

/// Retry policy declared on a step.
///
/// Backoff is a fixed, non-negative number of seconds between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
}

fn default_backoff_seconds() -> u64 {
    1
}

impl RetryConfig {
    pub fn new(max_retries: u32, backoff_seconds: u64) -> Self {
        Self {
            max_retries,
            backoff_seconds,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

/// A single declarative unit inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub workflow_id: WorkflowId,
    pub config: StepConfig,
    /// 1-based position within the workflow. Strictly increasing,
    /// duplicates are rejected at registration.
    pub order: u32,
    /// Wall-clock deadline. `None` means the engine default applies.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// JSON schema validated against the step input before execution.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// JSON schema validated against the step output after execution.
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    pub created_at: DateTime<Utc>,
}

impl Step {
    pub fn new(workflow_id: WorkflowId, order: u32, config: StepConfig) -> Self {
        Self {
            id: StepId::new(),
            workflow_id,
            config,
            order,
            timeout_seconds: None,
            input_schema: None,
            output_schema: None,
            retry: None,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> StepKind {
        self.config.kind()
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// A reusable, versioned definition of ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Monotonic version, snapshotted onto each execution at start.
    pub version: i32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            version: 1,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }
}
