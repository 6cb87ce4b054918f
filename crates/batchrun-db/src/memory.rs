//! In-memory store for tests and embedded use.
//!
//! Implements the same traits as the PostgreSQL repositories, with the same
//! selection policy: oldest incomplete batch first, uniformly random task
//! among the unprocessed ones. State lives behind a single lock, so every
//! individual call is atomic, but nothing spans calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use batchrun_core::{
    new_v7, Batch, BatchAdmin, BatchProgress, BatchStore, Error, Result, Task, TaskStore,
};

#[derive(Default)]
struct MemoryState {
    /// Insertion order doubles as creation order.
    batches: Vec<Batch>,
    tasks: HashMap<Uuid, Task>,
}

/// Shared in-memory batch and task store. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a batch record as-is.
    pub async fn insert_batch(&self, batch: Batch) {
        let mut state = self.state.write().await;
        match state.batches.iter_mut().find(|b| b.id == batch.id) {
            Some(existing) => *existing = batch,
            None => state.batches.push(batch),
        }
    }

    /// Insert or replace a task record as-is.
    pub async fn insert_task(&self, task: Task) {
        self.state.write().await.tasks.insert(task.id, task);
    }

    /// Get a task by ID.
    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        self.state.read().await.tasks.get(&task_id).cloned()
    }

    /// All tasks of a batch, in no particular order.
    pub async fn tasks_for_batch(&self, batch_id: Uuid) -> Vec<Task> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.batch_id == batch_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn find_incomplete(&self) -> Result<Option<Batch>> {
        let state = self.state.read().await;
        Ok(state.batches.iter().find(|b| !b.is_complete()).cloned())
    }

    async fn save(&self, batch: &Batch) -> Result<()> {
        let mut state = self.state.write().await;
        match state.batches.iter_mut().find(|b| b.id == batch.id) {
            Some(existing) => {
                let completed_on = existing.completed_on.or(batch.completed_on);
                *existing = batch.clone();
                existing.completed_on = completed_on;
            }
            None => state.batches.push(batch.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_unprocessed_for_batch(&self, batch_id: Uuid) -> Result<Option<Task>> {
        let state = self.state.read().await;
        let candidates: Vec<&Task> = state
            .tasks
            .values()
            .filter(|t| t.batch_id == batch_id && !t.processed)
            .collect();
        Ok(candidates
            .choose(&mut rand::thread_rng())
            .map(|t| (*t).clone()))
    }

    async fn mark_processed(&self, task_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        task.processed = true;
        Ok(())
    }
}

#[async_trait]
impl BatchAdmin for InMemoryStore {
    async fn enqueue(
        &self,
        batch_params: JsonValue,
        payloads: Vec<Option<JsonValue>>,
    ) -> Result<Uuid> {
        let batch = Batch::new(new_v7(), batch_params);
        let batch_id = batch.id;

        let mut state = self.state.write().await;
        state.batches.push(batch);
        for payload in payloads {
            let task = Task::new(new_v7(), batch_id, payload);
            state.tasks.insert(task.id, task);
        }
        Ok(batch_id)
    }

    async fn get(&self, batch_id: Uuid) -> Result<Option<Batch>> {
        let state = self.state.read().await;
        Ok(state.batches.iter().find(|b| b.id == batch_id).cloned())
    }

    async fn progress(&self, batch_id: Uuid) -> Result<Option<BatchProgress>> {
        let state = self.state.read().await;
        let Some(batch) = state.batches.iter().find(|b| b.id == batch_id) else {
            return Ok(None);
        };

        let (total, processed) = state
            .tasks
            .values()
            .filter(|t| t.batch_id == batch_id)
            .fold((0i64, 0i64), |(total, processed), t| {
                (total + 1, processed + i64::from(t.processed))
            });

        Ok(Some(BatchProgress {
            batch_id,
            total,
            processed,
            completed_on: batch.completed_on,
        }))
    }

    async fn list_incomplete(&self, limit: i64) -> Result<Vec<Batch>> {
        let state = self.state.read().await;
        Ok(state
            .batches
            .iter()
            .filter(|b| !b.is_complete())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
