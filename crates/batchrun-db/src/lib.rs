//! # batchrun-db
//!
//! Storage layer for batchrun.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL batch and task repositories
//! - An in-memory store with the same contracts, for tests and embedding
//!
//! ## Example
//!
//! ```rust,ignore
//! use batchrun_db::{BatchAdmin, Database};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/batchrun").await?;
//!
//!     let batch_id = db
//!         .batches
//!         .enqueue(json!({"kind": "reindex"}), vec![Some(json!({"doc": 1}))])
//!         .await?;
//!
//!     println!("Enqueued batch: {}", batch_id);
//!     Ok(())
//! }
//! ```
pub mod batches;
pub mod memory;
pub mod pool;
pub mod tasks;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use batchrun_core::*;

// Re-export repository implementations
pub use batches::PgBatchRepository;
pub use memory::InMemoryStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tasks::PgTaskRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Batch repository (store + administration).
    pub batches: PgBatchRepository,
    /// Task repository.
    pub tasks: PgTaskRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            batches: PgBatchRepository::new(pool.clone()),
            tasks: PgTaskRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
