//! Data models for batches and their tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A collection of tasks sharing one parameter set, tracked to completion as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    /// Opaque batch configuration, handed verbatim to every task execution.
    /// Expected to be a JSON object (`{}` when empty).
    pub batch_params: JsonValue,
    /// `None` while the batch still has outstanding work.
    pub completed_on: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Create a new, incomplete batch.
    pub fn new(id: Uuid, batch_params: JsonValue) -> Self {
        Self {
            id,
            batch_params,
            completed_on: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the batch has been closed.
    pub fn is_complete(&self) -> bool {
        self.completed_on.is_some()
    }

    /// Close the batch at `at`. A batch that is already closed keeps its
    /// original completion time.
    pub fn mark_complete(&mut self, at: DateTime<Utc>) {
        if self.completed_on.is_none() {
            self.completed_on = Some(at);
        }
    }

    /// The bulk operation kind, read from `batch_params["kind"]`.
    pub fn kind(&self) -> Option<&str> {
        batch_kind(&self.batch_params)
    }
}

/// Read the bulk operation kind from a batch parameter mapping.
pub fn batch_kind(batch_params: &JsonValue) -> Option<&str> {
    batch_params
        .get(crate::defaults::BATCH_KIND_KEY)
        .and_then(JsonValue::as_str)
}

/// One unit of deferred work belonging to exactly one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub processed: bool,
    /// Domain-specific fields, consumed only by executors.
    pub payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new unprocessed task for `batch_id`.
    pub fn new(id: Uuid, batch_id: Uuid, payload: Option<JsonValue>) -> Self {
        Self {
            id,
            batch_id,
            processed: false,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Progress summary for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub total: i64,
    pub processed: i64,
    pub completed_on: Option<DateTime<Utc>>,
}

impl BatchProgress {
    /// Tasks still waiting for a unit of work.
    pub fn remaining(&self) -> i64 {
        (self.total - self.processed).max(0)
    }

    /// Processed share in whole percent. An empty batch counts as 100%.
    pub fn percent(&self) -> i32 {
        if self.total <= 0 {
            return 100;
        }
        ((self.processed.min(self.total) * 100) / self.total) as i32
    }
}
