//! Batch repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use batchrun_core::{new_v7, Batch, BatchAdmin, BatchProgress, BatchStore, Error, Result};

/// PostgreSQL implementation of BatchStore and BatchAdmin.
#[derive(Clone)]
pub struct PgBatchRepository {
    pool: Pool<Postgres>,
}

impl PgBatchRepository {
    /// Create a new PgBatchRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a batch row into a Batch struct.
    fn parse_batch_row(row: sqlx::postgres::PgRow) -> Batch {
        Batch {
            id: row.get("id"),
            batch_params: row.get("batch_params"),
            completed_on: row.get("completed_on"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl BatchStore for PgBatchRepository {
    async fn find_incomplete(&self) -> Result<Option<Batch>> {
        let row = sqlx::query(
            "SELECT id, batch_params, completed_on, created_at
             FROM batch
             WHERE completed_on IS NULL
             ORDER BY created_at ASC, id ASC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_batch_row))
    }

    async fn save(&self, batch: &Batch) -> Result<()> {
        // COALESCE keeps the first completion time: a closed batch is never
        // reopened and concurrent completions converge on one timestamp.
        sqlx::query(
            "INSERT INTO batch (id, batch_params, completed_on, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET batch_params = EXCLUDED.batch_params,
                 completed_on = COALESCE(batch.completed_on, EXCLUDED.completed_on)",
        )
        .bind(batch.id)
        .bind(&batch.batch_params)
        .bind(batch.completed_on)
        .bind(batch.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "batch_store",
            op = "save",
            batch_id = %batch.id,
            complete = batch.is_complete(),
            "Batch saved"
        );
        Ok(())
    }
}

#[async_trait]
impl BatchAdmin for PgBatchRepository {
    async fn enqueue(
        &self,
        batch_params: JsonValue,
        payloads: Vec<Option<JsonValue>>,
    ) -> Result<Uuid> {
        let batch_id = new_v7();
        let now = Utc::now();
        let task_count = payloads.len();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO batch (id, batch_params, completed_on, created_at)
             VALUES ($1, $2, NULL, $3)",
        )
        .bind(batch_id)
        .bind(&batch_params)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for payload in payloads {
            sqlx::query(
                "INSERT INTO task (id, batch_id, processed, payload, created_at)
                 VALUES ($1, $2, false, $3, $4)",
            )
            .bind(new_v7())
            .bind(batch_id)
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "batch_store",
            op = "enqueue",
            batch_id = %batch_id,
            task_count,
            "Batch enqueued"
        );
        Ok(batch_id)
    }

    async fn get(&self, batch_id: Uuid) -> Result<Option<Batch>> {
        let row = sqlx::query(
            "SELECT id, batch_params, completed_on, created_at
             FROM batch WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_batch_row))
    }

    async fn progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>> {
        let row = sqlx::query(
            "SELECT b.id, b.completed_on,
                    COUNT(t.id) AS total,
                    COUNT(t.id) FILTER (WHERE t.processed) AS processed
             FROM batch b
             LEFT JOIN task t ON t.batch_id = b.id
             WHERE b.id = $1
             GROUP BY b.id, b.completed_on",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| BatchProgress {
            batch_id: row.get("id"),
            total: row.get("total"),
            processed: row.get("processed"),
            completed_on: row.get("completed_on"),
        }))
    }

    async fn list_incomplete(&self, limit: i64) -> Result<Vec<Batch>> {
        let rows = sqlx::query(
            "SELECT id, batch_params, completed_on, created_at
             FROM batch
             WHERE completed_on IS NULL
             ORDER BY created_at ASC, id ASC
             LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_batch_row).collect())
    }
}
