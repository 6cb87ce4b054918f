//! # batchrun-jobs
//!
//! Batch processing engine for batchrun.
//!
//! This crate provides:
//! - [`BatchProcessor`], which advances one task of an incomplete batch per call
//! - A polling [`BatchWorker`] with graceful shutdown and event broadcasting
//! - Kind-based dispatch ([`ExecutorRegistry`]) and an explicit no-effect
//!   drain ([`MarkProcessedExecutor`], selected by [`DrainMode::Mark`])
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use batchrun_db::Database;
//! use batchrun_jobs::{ExecutorRegistry, WorkerBuilder, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let registry = ExecutorRegistry::new().with("reindex", Arc::new(ReindexExecutor::new()));
//!
//! let worker = WorkerBuilder::new(Arc::new(db.batches.clone()), Arc::new(db.tasks.clone()))
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_executor(Arc::new(registry))
//!     .build()?;
//!
//! let handle = worker.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod executor;
pub mod processor;
pub mod worker;

// Re-export core types
pub use batchrun_core::*;

pub use executor::{executor_for_mode, DrainMode, ExecutorRegistry, MarkProcessedExecutor};
pub use processor::BatchProcessor;
pub use worker::{BatchWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
