//! Core traits for batchrun abstractions.
//!
//! The engine consumes stores and executors only through these traits, so a
//! PostgreSQL store, an in-memory fake, or any other backend can stand in.
//!
//! ## Concurrency
//!
//! Task selection and batch completion are independent read-then-write steps,
//! not an atomic claim. Several engines draining the same batch may select the
//! same task, so executors get **at-least-once** delivery and must be
//! idempotent.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::context::ProcessingContext;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Durable collection of batch records.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Find any batch whose `completed_on` is unset.
    ///
    /// Which batch is returned when several are incomplete is store-defined.
    async fn find_incomplete(&self) -> Result<Option<Batch>>;

    /// Persist the full batch record.
    async fn save(&self, batch: &Batch) -> Result<()>;
}

/// Durable collection of task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Find one task of `batch_id` with `processed == false`.
    ///
    /// The pick among several matches need not be deterministic.
    async fn find_unprocessed_for_batch(&self, batch_id: Uuid) -> Result<Option<Task>>;

    /// Flip a task's `processed` flag. Called by executors, never by the engine.
    async fn mark_processed(&self, task_id: Uuid) -> Result<()>;
}

/// Batch creation and inspection, used by operators and tests.
#[async_trait]
pub trait BatchAdmin: Send + Sync {
    /// Create a batch and one task per payload in a single unit.
    async fn enqueue(
        &self,
        batch_params: JsonValue,
        payloads: Vec<Option<JsonValue>>,
    ) -> Result<Uuid>;

    /// Get a batch by ID.
    async fn get(&self, batch_id: Uuid) -> Result<Option<Batch>>;

    /// Task counts for a batch.
    async fn progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>>;

    /// List up to `limit` incomplete batches, oldest first. A negative
    /// limit is treated as zero.
    async fn list_incomplete(&self, limit: i64) -> Result<Vec<Batch>>;
}

// =============================================================================
// EXECUTOR TRAIT
// =============================================================================

/// Performs one task's domain effect and marks the task processed.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute the unit of work for `task_id`.
    ///
    /// Implementations may consult `ctx` to stop early. Returning `Ok` without
    /// marking the task processed makes the engine select it again.
    async fn execute(
        &self,
        task_id: Uuid,
        batch_params: &JsonValue,
        ctx: &ProcessingContext,
    ) -> Result<()>;
}
