//! Centralized default constants for batchrun.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the worker binary reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// DATABASE
// =============================================================================

/// Database URL used by the worker binary when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/batchrun";

/// Default maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle connection timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds (30 minutes).
pub const DB_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// BATCH PROCESSING
// =============================================================================

/// Default poll interval in milliseconds when the engine reports no work.
///
/// While a batch has outstanding tasks the worker calls the engine back to
/// back; this interval only applies once the queue is drained.
pub const BATCH_POLL_INTERVAL_MS: u64 = 1_000;

/// Consecutive engine failures tolerated before the worker stops.
///
/// Zero means the worker never stops on its own.
pub const BATCH_MAX_CONSECUTIVE_ERRORS: u32 = 0;

/// Seconds the worker binary waits for the loop to exit after a signal.
pub const WORKER_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Key in `batch_params` naming the kind of bulk operation.
pub const BATCH_KIND_KEY: &str = "kind";

/// Default page size when listing incomplete batches.
pub const LIST_INCOMPLETE_LIMIT: i64 = 50;

// =============================================================================
// LOGGING
// =============================================================================

/// Default `RUST_LOG` filter for the worker binary.
pub const LOG_FILTER: &str = "batchrun_worker=info,batchrun_jobs=info,batchrun_db=info";
