//! Batch processing engine: advances one task per call.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, trace};

use batchrun_core::{BatchStore, ProcessingContext, Result, TaskExecutor, TaskStore};

/// Drives incomplete batches forward one unit of work at a time.
///
/// The processor holds no state between calls; everything lives in the
/// stores. Each [`process`](Self::process) call performs at most one batch
/// read, one task read, one batch write and one executor call, and
/// propagates any collaborator error unchanged.
#[derive(Clone)]
pub struct BatchProcessor {
    batches: Arc<dyn BatchStore>,
    tasks: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
}

impl BatchProcessor {
    /// Create a processor over the given stores and executor.
    pub fn new(
        batches: Arc<dyn BatchStore>,
        tasks: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            batches,
            tasks,
            executor,
        }
    }

    /// Advance at most one task of an incomplete batch.
    ///
    /// Returns `true` when the caller should call again soon (a task was
    /// executed, or work was deferred because `ctx` is cancelled) and `false`
    /// when there was no incomplete batch or the selected batch has just been
    /// closed.
    #[instrument(
        skip(self, ctx),
        fields(subsystem = "jobs", component = "processor", op = "process")
    )]
    pub async fn process(&self, ctx: &ProcessingContext) -> Result<bool> {
        let Some(mut batch) = self.batches.find_incomplete().await? else {
            trace!("No incomplete batch");
            return Ok(false);
        };

        // Checked before task lookup so cancellation never closes a batch.
        if ctx.is_cancelled() {
            debug!(batch_id = %batch.id, "Cancellation requested, deferring batch");
            return Ok(true);
        }

        let Some(task) = self.tasks.find_unprocessed_for_batch(batch.id).await? else {
            batch.mark_complete(Utc::now());
            self.batches.save(&batch).await?;
            info!(
                batch_id = %batch.id,
                batch_kind = batch.kind().unwrap_or("-"),
                "Batch completed"
            );
            return Ok(false);
        };

        let start = Instant::now();
        debug!(batch_id = %batch.id, task_id = %task.id, "Executing task");
        self.executor
            .execute(task.id, &batch.batch_params, ctx)
            .await?;
        debug!(
            batch_id = %batch.id,
            task_id = %task.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Task executed"
        );

        Ok(true)
    }
}
