//! Integration tests for BatchWorker.
//!
//! This test suite validates:
//! - Worker-001: Worker drains every batch through a kind registry
//! - Worker-002: Shutdown reaches an executor blocked on cancellation
//! - Worker-003: Two workers over one store close each batch exactly once
//! - Worker-004: End-to-end drain against PostgreSQL (ignored by default)
//! - Worker-005: Default drain mode never closes a batch of an unregistered kind
//!
//! NOTE: Stores and executors are shared via `Arc`; every test builds its own
//! store so parallel tests never observe each other's batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchrun_db::test_fixtures::TestDatabase;
use batchrun_db::InMemoryStore;
use batchrun_jobs::{
    executor_for_mode, BatchAdmin, Error, ExecutorRegistry, MarkProcessedExecutor,
    ProcessingContext, Result, TaskExecutor, TaskStore, WorkerBuilder, WorkerConfig, WorkerEvent,
};
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// HELPER EXECUTORS
// ============================================================================

/// Marks tasks processed and counts executions per kind.
struct CountingExecutor {
    kind: &'static str,
    tasks: Arc<dyn TaskStore>,
    counts: Arc<Mutex<HashMap<&'static str, usize>>>,
}

#[async_trait]
impl TaskExecutor for CountingExecutor {
    async fn execute(
        &self,
        task_id: Uuid,
        _batch_params: &JsonValue,
        _ctx: &ProcessingContext,
    ) -> Result<()> {
        *self.counts.lock().await.entry(self.kind).or_default() += 1;
        self.tasks.mark_processed(task_id).await
    }
}

/// Parks until the context is cancelled, then leaves the task unprocessed.
struct ParkingExecutor {
    entered: Arc<Notify>,
}

#[async_trait]
impl TaskExecutor for ParkingExecutor {
    async fn execute(
        &self,
        _task_id: Uuid,
        _batch_params: &JsonValue,
        ctx: &ProcessingContext,
    ) -> Result<()> {
        self.entered.notify_one();
        while !ctx.is_cancelled() {
            sleep(Duration::from_millis(5)).await;
        }
        Err(Error::Execution("cancelled".into()))
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Wait until the worker reports it has nothing left to do.
async fn wait_for_idle(events: &mut broadcast::Receiver<WorkerEvent>) {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::Idle) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("worker exited early"),
            }
        }
    })
    .await
    .expect("timed out waiting for idle worker");
}

/// Wait until the worker loop exits.
async fn wait_for_stop(events: &mut broadcast::Receiver<WorkerEvent>) {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::WorkerStopped) | Err(broadcast::error::RecvError::Closed) => {
                    return
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for worker to stop");
}

/// Poll the store until no incomplete batch remains.
async fn wait_for_drained(store: &InMemoryStore) {
    timeout(WAIT, async {
        while !store.list_incomplete(1).await.unwrap().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for batches to drain");
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_worker_drains_batches_by_kind() {
    let store = InMemoryStore::new();
    let tasks: Arc<dyn TaskStore> = Arc::new(store.clone());
    let counts = Arc::new(Mutex::new(HashMap::new()));

    let registry = ExecutorRegistry::new()
        .with(
            "reindex",
            Arc::new(CountingExecutor {
                kind: "reindex",
                tasks: tasks.clone(),
                counts: counts.clone(),
            }),
        )
        .with(
            "notify",
            Arc::new(CountingExecutor {
                kind: "notify",
                tasks: tasks.clone(),
                counts: counts.clone(),
            }),
        );

    let reindex = store
        .enqueue(json!({"kind": "reindex"}), vec![None; 4])
        .await
        .unwrap();
    let notify = store
        .enqueue(json!({"kind": "notify", "channel": "ops"}), vec![None; 2])
        .await
        .unwrap();

    let worker = WorkerBuilder::new(Arc::new(store.clone()), tasks)
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .with_executor(Arc::new(registry))
        .build()
        .unwrap();
    let mut events = worker.events();
    let handle = worker.start();

    wait_for_drained(&store).await;
    wait_for_idle(&mut events).await;

    let counts = counts.lock().await.clone();
    assert_eq!(counts.get("reindex"), Some(&4));
    assert_eq!(counts.get("notify"), Some(&2));

    for batch_id in [reindex, notify] {
        let progress = store.progress(batch_id).await.unwrap().unwrap();
        assert_eq!(progress.remaining(), 0);
        assert!(progress.completed_on.is_some());
    }

    handle.shutdown().await.unwrap();
    wait_for_stop(&mut events).await;
}

#[tokio::test]
async fn test_shutdown_reaches_blocked_executor() {
    let store = InMemoryStore::new();
    let batch_id = store.enqueue(json!({}), vec![None]).await.unwrap();
    let entered = Arc::new(Notify::new());

    let worker = WorkerBuilder::new(Arc::new(store.clone()), Arc::new(store.clone()))
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .with_executor(Arc::new(ParkingExecutor {
            entered: entered.clone(),
        }))
        .build()
        .unwrap();
    let mut events = worker.events();
    let handle = worker.start();

    timeout(WAIT, entered.notified())
        .await
        .expect("executor never started");
    handle.shutdown().await.unwrap();
    wait_for_stop(&mut events).await;

    let progress = store.progress(batch_id).await.unwrap().unwrap();
    assert_eq!(progress.processed, 0);
    assert!(progress.completed_on.is_none());
}

#[tokio::test]
async fn test_two_workers_share_one_store() {
    let store = InMemoryStore::new();
    let mut batch_ids = Vec::new();
    for i in 0..3 {
        batch_ids.push(
            store
                .enqueue(json!({"kind": "migrate", "shard": i}), vec![None; 5])
                .await
                .unwrap(),
        );
    }

    let mut handles = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..2 {
        let tasks: Arc<dyn TaskStore> = Arc::new(store.clone());
        let worker = WorkerBuilder::new(Arc::new(store.clone()), tasks.clone())
            .with_config(WorkerConfig::default().with_poll_interval(10))
            .with_executor(Arc::new(MarkProcessedExecutor::new(tasks)))
            .build()
            .unwrap();
        receivers.push(worker.events());
        handles.push(worker.start());
    }

    wait_for_drained(&store).await;

    for batch_id in &batch_ids {
        let progress = store.progress(*batch_id).await.unwrap().unwrap();
        assert_eq!(progress.processed, 5);
        assert!(progress.completed_on.is_some());
    }

    for handle in &handles {
        handle.shutdown().await.unwrap();
    }
    for rx in &mut receivers {
        wait_for_stop(rx).await;
    }
}

#[tokio::test]
async fn test_unregistered_kind_stays_open_under_default_mode() {
    let store = InMemoryStore::new();
    let batch_id = store
        .enqueue(json!({"kind": "reindex"}), vec![None; 3])
        .await
        .unwrap();

    let config = WorkerConfig::from_lookup(|_| None)
        .with_poll_interval(1)
        .with_max_consecutive_errors(2);
    let tasks: Arc<dyn TaskStore> = Arc::new(store.clone());
    let executor = executor_for_mode(config.drain_mode, ExecutorRegistry::new(), tasks.clone());
    let worker = WorkerBuilder::new(Arc::new(store.clone()), tasks)
        .with_config(config)
        .with_executor(executor)
        .build()
        .unwrap();
    let mut events = worker.events();
    let _handle = worker.start();

    let mut failures = Vec::new();
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::ProcessFailed { error, .. }) => failures.push(error),
                Ok(WorkerEvent::WorkerStopped) | Err(broadcast::error::RecvError::Closed) => break,
                _ => {}
            }
        }
    })
    .await
    .expect("worker never gave up");

    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|e| e.contains("reindex")));

    let progress = store.progress(batch_id).await.unwrap().unwrap();
    assert_eq!(progress.processed, 0);
    assert!(progress.completed_on.is_none());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_worker_drains_postgres_batch() {
    let test_db = TestDatabase::new().await;
    let batch_id = test_db.seed_batch(json!({"kind": "reindex"}), 5).await;

    let tasks: Arc<dyn TaskStore> = Arc::new(test_db.db.tasks.clone());
    let worker = WorkerBuilder::new(Arc::new(test_db.db.batches.clone()), tasks.clone())
        .with_config(WorkerConfig::default().with_poll_interval(50))
        .with_executor(Arc::new(MarkProcessedExecutor::new(tasks)))
        .build()
        .unwrap();
    let mut events = worker.events();
    let handle = worker.start();

    wait_for_idle(&mut events).await;

    let progress = test_db.db.batches.progress(batch_id).await.unwrap().unwrap();
    assert_eq!(progress.processed, 5);
    assert!(progress.completed_on.is_some());

    handle.shutdown().await.unwrap();
    wait_for_stop(&mut events).await;
    test_db.cleanup().await;
}
