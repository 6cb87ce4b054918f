//! # batchrun-core
//!
//! Core types, traits, and abstractions for the batchrun engine.
//!
//! This crate provides the batch and task data model, the processing context
//! carrying cooperative cancellation, and the store/executor traits that the
//! engine in `batchrun-jobs` is written against.

pub mod context;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use context::ProcessingContext;
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
