//! Structured logging field name constants for batchrun.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query every subsystem the same way.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), batch completions |
//! | DEBUG | Decision points (no batch, cancelled, task selected) |
//! | TRACE | Per-call noise |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "jobs", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "processor", "worker", "pool", "batch_store", "task_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "process", "find_incomplete", "save", "enqueue"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Batch UUID being operated on.
pub const BATCH_ID: &str = "batch_id";

/// Task UUID being operated on.
pub const TASK_ID: &str = "task_id";

/// Bulk operation kind taken from `batch_params`.
pub const BATCH_KIND: &str = "batch_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of tasks created or affected.
pub const TASK_COUNT: &str = "task_count";

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Consecutive failure count in the worker loop.
pub const CONSECUTIVE_ERRORS: &str = "consecutive_errors";
