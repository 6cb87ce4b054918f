//! Reference task executors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use batchrun_core::{batch_kind, Error, ProcessingContext, Result, TaskExecutor, TaskStore};

/// Executor with no domain effect: it only marks the task processed.
///
/// Useful for draining stale batches and for smoke-testing a deployment.
pub struct MarkProcessedExecutor {
    tasks: Arc<dyn TaskStore>,
}

impl MarkProcessedExecutor {
    /// Create an executor that marks tasks processed in `tasks`.
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskExecutor for MarkProcessedExecutor {
    async fn execute(
        &self,
        task_id: Uuid,
        _batch_params: &JsonValue,
        _ctx: &ProcessingContext,
    ) -> Result<()> {
        trace!(task_id = %task_id, "Marking task processed without effect");
        self.tasks.mark_processed(task_id).await
    }
}

/// Executor that dispatches on the batch's `kind` parameter.
///
/// One worker can then drain batches of different bulk operations, each
/// handled by the executor registered under its kind.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor. Replaces any executor for the same kind.
    pub fn register(&mut self, kind: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        let kind = kind.into();
        debug!(batch_kind = %kind, "Registered task executor");
        self.executors.insert(kind, executor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(kind, executor);
        self
    }

    /// Check if an executor is registered for `kind`.
    pub fn has_executor(&self, kind: &str) -> bool {
        self.executors.contains_key(kind)
    }

    /// List registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[async_trait]
impl TaskExecutor for ExecutorRegistry {
    async fn execute(
        &self,
        task_id: Uuid,
        batch_params: &JsonValue,
        ctx: &ProcessingContext,
    ) -> Result<()> {
        let kind = batch_kind(batch_params).ok_or_else(|| {
            Error::Execution(format!("Batch parameters for task {task_id} carry no kind"))
        })?;
        let executor = self.executors.get(kind).ok_or_else(|| {
            Error::Execution(format!("No executor registered for batch kind: {kind}"))
        })?;
        executor.execute(task_id, batch_params, ctx).await
    }
}

/// How a worker turns tasks into effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainMode {
    /// Dispatch on the batch kind through an [`ExecutorRegistry`]. Batches of
    /// an unregistered kind fail and stay open.
    #[default]
    Registry,
    /// Mark every task processed without running anything.
    Mark,
}

impl FromStr for DrainMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registry" => Ok(Self::Registry),
            "mark" => Ok(Self::Mark),
            other => Err(Error::Config(format!("Unknown drain mode: {other}"))),
        }
    }
}

impl fmt::Display for DrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registry => "registry",
            Self::Mark => "mark",
        })
    }
}

/// Pick the executor a worker runs with.
///
/// [`DrainMode::Mark`] ignores `registry` and discards every task's effect.
pub fn executor_for_mode(
    mode: DrainMode,
    registry: ExecutorRegistry,
    tasks: Arc<dyn TaskStore>,
) -> Arc<dyn TaskExecutor> {
    match mode {
        DrainMode::Registry => Arc::new(registry),
        DrainMode::Mark => {
            warn!("Drain mode is mark: tasks are marked processed without running");
            Arc::new(MarkProcessedExecutor::new(tasks))
        }
    }
}
