//! Task repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::trace;
use uuid::Uuid;

use batchrun_core::{Error, Result, Task, TaskStore};

/// PostgreSQL implementation of TaskStore.
#[derive(Clone)]
pub struct PgTaskRepository {
    pool: Pool<Postgres>,
}

impl PgTaskRepository {
    /// Create a new PgTaskRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a task row into a Task struct.
    fn parse_task_row(row: sqlx::postgres::PgRow) -> Task {
        Task {
            id: row.get("id"),
            batch_id: row.get("batch_id"),
            processed: row.get("processed"),
            payload: row.get("payload"),
            created_at: row.get("created_at"),
        }
    }

    /// List all tasks of a batch in creation order.
    pub async fn list_for_batch(&self, batch_id: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, batch_id, processed, payload, created_at
             FROM task WHERE batch_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_task_row).collect())
    }
}

#[async_trait]
impl TaskStore for PgTaskRepository {
    async fn find_unprocessed_for_batch(&self, batch_id: Uuid) -> Result<Option<Task>> {
        // Random pick spreads concurrent workers draining the same batch
        // across different rows.
        let row = sqlx::query(
            "SELECT id, batch_id, processed, payload, created_at
             FROM task
             WHERE batch_id = $1 AND processed = false
             ORDER BY random()
             LIMIT 1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_task_row))
    }

    async fn mark_processed(&self, task_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE task SET processed = true WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("task {task_id}")));
        }

        trace!(
            subsystem = "db",
            component = "task_store",
            op = "mark_processed",
            task_id = %task_id,
            "Task marked processed"
        );
        Ok(())
    }
}
