//! Embedded schema migrations.
//!
//! The schema ships inside the crate as a strictly ordered list of
//! versioned SQL batches. A single-row cursor table records the highest
//! version applied; anything above the cursor runs, each batch in its own
//! transaction. There is no rollback path: history tables are append-only,
//! so a bad migration is fixed by a follow-up version.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Brings the database schema up to the latest embedded version.
/// Returns how many migrations actually ran.
pub async fn apply_migrations(pool: &PgPool) -> Result<u32> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL,
            migrated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let (cursor,): (i32,) =
        sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await?;
    debug!(cursor, "Checking for pending schema migrations");

    let mut applied = 0;
    for migration in migrations() {
        if migration.version <= cursor {
            continue;
        }

        debug!(
            version = migration.version,
            name = migration.name,
            "Applying schema migration"
        );

        let mut tx = pool.begin().await?;
        sqlx::query(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::Migration(format!(
                    "schema migration {} ({}) did not apply: {e}",
                    migration.version, migration.name
                ))
            })?;
        sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        applied += 1;
    }

    if applied > 0 {
        info!(applied, "Schema migrated");
    } else {
        debug!("Schema already current");
    }
    Ok(applied)
}

fn migrations() -> &'static [Migration] {
    &[Migration {
        version: 1,
        name: "core_tables",
        sql: r#"
        CREATE TABLE workflows (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_by VARCHAR(255) NOT NULL,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        );

        CREATE TABLE steps (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
            config JSONB NOT NULL,
            step_order INTEGER NOT NULL,
            timeout_seconds BIGINT,
            input_schema JSONB,
            output_schema JSONB,
            max_retries INTEGER,
            backoff_seconds BIGINT,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            UNIQUE (workflow_id, step_order)
        );
        CREATE INDEX idx_steps_workflow_id ON steps(workflow_id);

        CREATE TABLE workflow_executions (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
            workflow_version INTEGER NOT NULL,
            status VARCHAR(16) NOT NULL,
            trigger_source VARCHAR(255) NOT NULL,
            started_at TIMESTAMP WITH TIME ZONE,
            finished_at TIMESTAMP WITH TIME ZONE,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        );
        CREATE INDEX idx_workflow_executions_workflow_id ON workflow_executions(workflow_id);
        CREATE INDEX idx_workflow_executions_status ON workflow_executions(status);

        CREATE TABLE step_attempts (
            id UUID PRIMARY KEY,
            workflow_execution_id UUID NOT NULL REFERENCES workflow_executions(id) ON DELETE CASCADE,
            step_id UUID NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
            status VARCHAR(16) NOT NULL,
            input JSONB,
            output JSONB,
            error TEXT,
            error_class VARCHAR(16),
            retry_count INTEGER NOT NULL DEFAULT 0,
            is_retry BOOLEAN NOT NULL DEFAULT FALSE,
            parent_attempt_id UUID REFERENCES step_attempts(id),
            step_metadata JSONB,
            started_at TIMESTAMP WITH TIME ZONE,
            finished_at TIMESTAMP WITH TIME ZONE,
            created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        );
        CREATE INDEX idx_step_attempts_execution_id ON step_attempts(workflow_execution_id);
        CREATE INDEX idx_step_attempts_step_id ON step_attempts(step_id);

        CREATE TABLE execution_logs (
            id UUID PRIMARY KEY,
            seq BIGSERIAL,
            workflow_execution_id UUID NOT NULL REFERENCES workflow_executions(id) ON DELETE CASCADE,
            step_attempt_id UUID REFERENCES step_attempts(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            timestamp TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
            metadata JSONB
        );
        CREATE INDEX idx_execution_logs_execution_id ON execution_logs(workflow_execution_id);
        CREATE INDEX idx_execution_logs_attempt_id ON execution_logs(step_attempt_id);
        "#,
    }]
}
