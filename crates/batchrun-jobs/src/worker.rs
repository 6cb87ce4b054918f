//! Worker loop that keeps calling the batch processor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use batchrun_core::defaults::{
    BATCH_MAX_CONSECUTIVE_ERRORS, BATCH_POLL_INTERVAL_MS, EVENT_BUS_CAPACITY,
};
use batchrun_core::{BatchStore, Error, ProcessingContext, Result, TaskExecutor, TaskStore};

use crate::executor::DrainMode;
use crate::processor::BatchProcessor;

/// Configuration for the batch worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep in milliseconds after the processor reports no work.
    pub poll_interval_ms: u64,
    /// Whether to run the loop at all.
    pub enabled: bool,
    /// Stop after this many failed calls in a row. Zero never stops.
    pub max_consecutive_errors: u32,
    /// How the hosting binary picks its executor.
    pub drain_mode: DrainMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: BATCH_POLL_INTERVAL_MS,
            enabled: true,
            max_consecutive_errors: BATCH_MAX_CONSECUTIVE_ERRORS,
            drain_mode: DrainMode::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BATCH_WORKER_ENABLED` | `true` | Enable/disable batch processing |
    /// | `BATCH_POLL_INTERVAL_MS` | `1000` | Sleep when no batch needs work |
    /// | `BATCH_MAX_CONSECUTIVE_ERRORS` | `0` | Failures in a row before stopping (0 = never) |
    /// | `BATCH_DRAIN_MODE` | `registry` | `registry` runs by kind, `mark` only marks tasks |
    ///
    /// An unrecognised drain mode falls back to `registry`, so work is never
    /// discarded by a typo.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("BATCH_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = lookup("BATCH_POLL_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(BATCH_POLL_INTERVAL_MS);

        let max_consecutive_errors = lookup("BATCH_MAX_CONSECUTIVE_ERRORS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(BATCH_MAX_CONSECUTIVE_ERRORS);

        let drain_mode = match lookup("BATCH_DRAIN_MODE") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring BATCH_DRAIN_MODE, using registry");
                DrainMode::Registry
            }),
            None => DrainMode::default(),
        };

        Self {
            poll_interval_ms,
            enabled,
            max_consecutive_errors,
            drain_mode,
        }
    }

    /// Set the idle poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Enable or disable the worker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the consecutive failure limit.
    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    /// Set the drain mode.
    pub fn with_drain_mode(mut self, mode: DrainMode) -> Self {
        self.drain_mode = mode;
        self
    }
}

/// Event emitted by the batch worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// A call made progress and more work may remain.
    Advanced,
    /// A call found nothing to do, or closed a batch.
    Idle,
    /// A call failed.
    ProcessFailed {
        error: String,
        consecutive_errors: u32,
    },
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    ctx: ProcessingContext,
}

impl WorkerHandle {
    /// Cancel in-flight work and signal the loop to stop.
    ///
    /// The loop exits at the next call boundary. Calling this after the
    /// worker has already stopped is a no-op. A context passed through
    /// [`WorkerBuilder::with_context`] is cancelled for all its holders.
    pub async fn shutdown(&self) -> Result<()> {
        self.ctx.cancel();
        match self.shutdown_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Shutdown already signalled");
                Ok(())
            }
        }
    }

    /// Get a receiver for worker events.
    ///
    /// Only events sent after this call are observed; use
    /// [`BatchWorker::events`] before starting to see `WorkerStarted`.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// The context shared with the processor and its executor.
    pub fn context(&self) -> &ProcessingContext {
        &self.ctx
    }
}

/// Worker that drives a [`BatchProcessor`] until shut down.
pub struct BatchWorker {
    processor: BatchProcessor,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
    ctx: ProcessingContext,
}

impl BatchWorker {
    /// Create a worker around an existing processor.
    pub fn new(processor: BatchProcessor, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            processor,
            config,
            event_tx,
            ctx: ProcessingContext::new(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let ctx = self.ctx.clone();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            ctx,
        }
    }

    /// Run the loop: back to back while there is work, poll-interval sleeps otherwise.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Batch worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_consecutive_errors = self.config.max_consecutive_errors,
            "Batch worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut consecutive_errors: u32 = 0;

        loop {
            if shutdown_rx.try_recv().is_ok() || self.ctx.is_cancelled() {
                info!("Batch worker received shutdown signal");
                break;
            }

            match self.processor.process(&self.ctx).await {
                Ok(true) => {
                    consecutive_errors = 0;
                    let _ = self.event_tx.send(WorkerEvent::Advanced);
                    // More work may remain: call again without sleeping.
                    continue;
                }
                Ok(false) => {
                    consecutive_errors = 0;
                    let _ = self.event_tx.send(WorkerEvent::Idle);
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    error!(
                        error = %e,
                        consecutive_errors,
                        "Batch processing failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::ProcessFailed {
                        error: e.to_string(),
                        consecutive_errors,
                    });

                    let limit = self.config.max_consecutive_errors;
                    if limit > 0 && consecutive_errors >= limit {
                        warn!(limit, "Too many consecutive failures, stopping batch worker");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Batch worker received shutdown signal");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Batch worker stopped");
    }
}

/// Builder for creating a batch worker.
pub struct WorkerBuilder {
    batches: Arc<dyn BatchStore>,
    tasks: Arc<dyn TaskStore>,
    executor: Option<Arc<dyn TaskExecutor>>,
    config: WorkerConfig,
    ctx: Option<ProcessingContext>,
}

impl WorkerBuilder {
    /// Create a new worker builder over the given stores.
    pub fn new(batches: Arc<dyn BatchStore>, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            batches,
            tasks,
            executor: None,
            config: WorkerConfig::default(),
            ctx: None,
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the executor that performs each task.
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Run with `ctx` instead of a fresh context.
    ///
    /// Cancellation is shared: [`WorkerHandle::shutdown`] on this worker
    /// cancels every other worker and holder of a clone of `ctx`, and
    /// cancelling `ctx` elsewhere stops this worker at its next call.
    pub fn with_context(mut self, ctx: ProcessingContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Build and return the worker.
    pub fn build(self) -> Result<BatchWorker> {
        let executor = self
            .executor
            .ok_or_else(|| Error::Config("Batch worker requires a task executor".into()))?;
        let processor = BatchProcessor::new(self.batches, self.tasks, executor);
        let mut worker = BatchWorker::new(processor, self.config);
        if let Some(ctx) = self.ctx {
            worker.ctx = ctx;
        }
        Ok(worker)
    }
}
