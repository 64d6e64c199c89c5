//! PostgreSQL store backend.
//!
//! Every state transition commits in one transaction together with its log
//! event, so readers of the durable store always see a monotonic history.
//! Immutability of terminal rows is enforced here as well as in the state
//! machines: the row is locked, its status checked, then updated.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use trellis_core::{
    ExecutionId, ExecutionStatus, LogEvent, RetryConfig, Step, StepAttempt, Workflow,
    WorkflowExecution, WorkflowId,
};

use crate::port::ExecutionStore;
use crate::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    version: i32,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Workflow {
            id: row.id.into(),
            name: row.name,
            version: row.version,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    workflow_id: Uuid,
    config: Value,
    step_order: i32,
    timeout_seconds: Option<i64>,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    max_retries: Option<i32>,
    backoff_seconds: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StepRow> for Step {
    type Error = StoreError;

    fn try_from(row: StepRow) -> Result<Self> {
        let retry = row.max_retries.map(|max| RetryConfig {
            max_retries: max.max(0) as u32,
            backoff_seconds: row.backoff_seconds.unwrap_or(1).max(0) as u64,
        });
        Ok(Step {
            id: row.id.into(),
            workflow_id: row.workflow_id.into(),
            config: serde_json::from_value(row.config)?,
            order: row.step_order.max(0) as u32,
            timeout_seconds: row.timeout_seconds.map(|t| t.max(0) as u64),
            input_schema: row.input_schema,
            output_schema: row.output_schema,
            retry,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    workflow_version: i32,
    status: String,
    trigger_source: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self> {
        Ok(WorkflowExecution {
            id: row.id.into(),
            workflow_id: row.workflow_id.into(),
            workflow_version: row.workflow_version,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            trigger_source: row.trigger_source,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    workflow_execution_id: Uuid,
    step_id: Uuid,
    status: String,
    input: Option<Value>,
    output: Option<Value>,
    error: Option<String>,
    error_class: Option<String>,
    retry_count: i32,
    is_retry: bool,
    parent_attempt_id: Option<Uuid>,
    step_metadata: Option<Value>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for StepAttempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self> {
        let error_class = row
            .error_class
            .map(|c| c.parse().map_err(StoreError::Corrupt))
            .transpose()?;
        Ok(StepAttempt {
            id: row.id.into(),
            workflow_execution_id: row.workflow_execution_id.into(),
            step_id: row.step_id.into(),
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            input: row.input,
            output: row.output,
            error: row.error,
            error_class,
            retry_count: row.retry_count.max(0) as u32,
            is_retry: row.is_retry,
            parent_attempt_id: row.parent_attempt_id.map(Into::into),
            step_metadata: row.step_metadata,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    workflow_execution_id: Uuid,
    step_attempt_id: Option<Uuid>,
    message: String,
    timestamp: DateTime<Utc>,
    metadata: Option<Value>,
}

impl From<LogRow> for LogEvent {
    fn from(row: LogRow) -> Self {
        LogEvent {
            id: row.id.into(),
            workflow_execution_id: row.workflow_execution_id.into(),
            step_attempt_id: row.step_attempt_id.map(Into::into),
            message: row.message,
            timestamp: row.timestamp,
            metadata: row.metadata.unwrap_or(Value::Null),
        }
    }
}

/// Postgres-backed implementation of [`ExecutionStore`].
#[derive(Debug, Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a dedicated pool. One connection per concurrently running
    /// workflow execution is enough; transitions are short transactions.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        info!(max_connections, "Execution store connected");
        Ok(Self::new(pool))
    }

    /// The underlying pool, e.g. for [`crate::apply_migrations`].
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_log_event(conn: &mut PgConnection, event: &LogEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO execution_logs (id, workflow_execution_id, step_attempt_id, message, timestamp, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(event.workflow_execution_id.as_uuid())
    .bind(event.step_attempt_id.map(|id| id.as_uuid()))
    .bind(&event.message)
    .bind(event.timestamp)
    .bind(&event.metadata)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn insert_workflow(&self, workflow: &Workflow, steps: &[Step]) -> Result<()> {
        debug!("Registering workflow: name={}", workflow.name);

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

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, version, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(workflow.id.as_uuid())
        .bind(&workflow.name)
        .bind(workflow.version)
        .bind(&workflow.created_by)
        .bind(workflow.created_at)
        .execute(&mut *tx)
        .await?;

        for step in &ordered {
            sqlx::query(
                r#"
                INSERT INTO steps (
                    id, workflow_id, config, step_order, timeout_seconds,
                    input_schema, output_schema, max_retries, backoff_seconds, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(step.id.as_uuid())
            .bind(step.workflow_id.as_uuid())
            .bind(serde_json::to_value(&step.config)?)
            .bind(step.order as i32)
            .bind(step.timeout_seconds.map(|t| t as i64))
            .bind(&step.input_schema)
            .bind(&step.output_schema)
            .bind(step.retry.map(|r| r.max_retries as i32))
            .bind(step.retry.map(|r| r.backoff_seconds as i64))
            .bind(step.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            "Workflow registered: id={}, steps={}",
            workflow.id,
            ordered.len()
        );
        Ok(())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        debug!("Creating workflow execution: id={}", execution.id);

        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workflow_id, workflow_version, status, trigger_source,
                started_at, finished_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(execution.id.as_uuid())
        .bind(execution.workflow_id.as_uuid())
        .bind(execution.workflow_version)
        .bind(execution.status.as_str())
        .bind(&execution.trigger_source)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_execution(
        &self,
        execution: &WorkflowExecution,
        log: Option<&LogEvent>,
    ) -> Result<()> {
        debug!(
            "Updating workflow execution: id={}, status={}",
            execution.id, execution.status
        );

        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM workflow_executions WHERE id = $1 FOR UPDATE")
                .bind(execution.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) = current.ok_or_else(|| {
            StoreError::not_found("workflow_execution", execution.id.to_string())
        })?;
        let status: ExecutionStatus = status.parse().map_err(StoreError::Corrupt)?;

        // The only sanctioned write against a terminal row: resume
        // reopening a failed execution.
        let reopening =
            status == ExecutionStatus::Failed && execution.status == ExecutionStatus::Running;
        if status.is_terminal() && !reopening {
            return Err(StoreError::immutability_violation(
                "workflow_execution",
                execution.id.to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $1, started_at = $2, finished_at = $3
            WHERE id = $4
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if let Some(event) = log {
            insert_log_event(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_attempt(&self, attempt: &StepAttempt) -> Result<()> {
        debug!(
            "Creating step attempt: id={}, retry_count={}",
            attempt.id, attempt.retry_count
        );

        sqlx::query(
            r#"
            INSERT INTO step_attempts (
                id, workflow_execution_id, step_id, status, input, output,
                error, error_class, retry_count, is_retry, parent_attempt_id,
                step_metadata, started_at, finished_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.workflow_execution_id.as_uuid())
        .bind(attempt.step_id.as_uuid())
        .bind(attempt.status.as_str())
        .bind(&attempt.input)
        .bind(&attempt.output)
        .bind(&attempt.error)
        .bind(attempt.error_class.map(|c| c.as_str()))
        .bind(attempt.retry_count as i32)
        .bind(attempt.is_retry)
        .bind(attempt.parent_attempt_id.map(|id| id.as_uuid()))
        .bind(&attempt.step_metadata)
        .bind(attempt.started_at)
        .bind(attempt.finished_at)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_attempt(&self, attempt: &StepAttempt, log: Option<&LogEvent>) -> Result<()> {
        debug!(
            "Updating step attempt: id={}, status={}",
            attempt.id, attempt.status
        );

        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM step_attempts WHERE id = $1 FOR UPDATE")
                .bind(attempt.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) =
            current.ok_or_else(|| StoreError::not_found("step_attempt", attempt.id.to_string()))?;
        let status: trellis_core::AttemptStatus = status.parse().map_err(StoreError::Corrupt)?;

        if status.is_terminal() {
            return Err(StoreError::immutability_violation(
                "step_attempt",
                attempt.id.to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE step_attempts
            SET status = $1, output = $2, error = $3, error_class = $4,
                step_metadata = $5, started_at = $6, finished_at = $7
            WHERE id = $8
            "#,
        )
        .bind(attempt.status.as_str())
        .bind(&attempt.output)
        .bind(&attempt.error)
        .bind(attempt.error_class.map(|c| c.as_str()))
        .bind(&attempt.step_metadata)
        .bind(attempt.started_at)
        .bind(attempt.finished_at)
        .bind(attempt.id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if let Some(event) = log {
            insert_log_event(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_log(&self, event: &LogEvent) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_log_event(&mut conn, event).await
    }

    async fn fetch_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("workflow", id.to_string()))?;

        Ok(row.into())
    }

    async fn fetch_execution(&self, id: ExecutionId) -> Result<WorkflowExecution> {
        let row =
            sqlx::query_as::<_, ExecutionRow>("SELECT * FROM workflow_executions WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::not_found("workflow_execution", id.to_string()))?;

        row.try_into()
    }

    async fn fetch_steps(&self, workflow_id: WorkflowId) -> Result<Vec<Step>> {
        let rows = sqlx::query_as::<_, StepRow>(
            "SELECT * FROM steps WHERE workflow_id = $1 ORDER BY step_order ASC",
        )
        .bind(workflow_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn fetch_attempts(&self, execution_id: ExecutionId) -> Result<Vec<StepAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM step_attempts
            WHERE workflow_execution_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(execution_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn fetch_logs(&self, execution_id: ExecutionId) -> Result<Vec<LogEvent>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, workflow_execution_id, step_attempt_id, message, timestamp, metadata
            FROM execution_logs
            WHERE workflow_execution_id = $1
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .bind(execution_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
