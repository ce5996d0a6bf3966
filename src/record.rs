// Record trait for ordered collections persisted under a single key

use crate::models::{AnalyticsEvent, Task};
use crate::storage::{self, Storage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Storage key holding the task array, in display order
pub const TASKS_KEY: &str = "tm_tasks_v1";

/// Storage key holding the analytics event array, in log order
pub const ANALYTICS_KEY: &str = "tm_analytics_v1";

/// Core trait for any element of a persisted collection
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Most recent timestamp for this record (milliseconds since epoch)
    fn timestamp(&self) -> i64;

    /// Key the whole collection is stored under
    fn storage_key() -> &'static str
    where
        Self: Sized;
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> i64 {
        self.updated_at
    }

    fn storage_key() -> &'static str {
        TASKS_KEY
    }
}

impl Record for AnalyticsEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn storage_key() -> &'static str {
        ANALYTICS_KEY
    }
}

/// Load a whole collection, empty when absent or unreadable
///
/// Records repeating an earlier id are dropped, keeping the first occurrence
/// and the stored order.
pub fn load_collection<T: Record>(storage: &dyn Storage) -> Vec<T> {
    let mut records: Vec<T> = storage::load(storage, T::storage_key(), Vec::new());

    let mut seen = HashSet::new();
    records.retain(|record| {
        let fresh = seen.insert(record.id().to_string());
        if !fresh {
            warn!(
                key = T::storage_key(),
                id = record.id(),
                timestamp = record.timestamp(),
                "Dropping record with duplicate id"
            );
        }
        fresh
    });
    records
}

/// Persist a whole collection, best effort
pub fn save_collection<T: Record>(storage: &dyn Storage, records: &[T]) {
    storage::save(storage, T::storage_key(), records);
}
