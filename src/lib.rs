// tasklist - Ordered task list with best-effort persistence and an analytics log

pub mod analytics;
pub mod app;
pub mod config;
pub mod filter;
pub mod models;
pub mod record;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use analytics::{EXPORT_FILE_NAME, EventLog};
pub use app::App;
pub use config::{Backend, Config};
pub use filter::{FilteredView, TaskQuery};
pub use models::{AnalyticsEvent, NewTask, Task, TaskPatch, now_ms};
pub use record::{ANALYTICS_KEY, Record, TASKS_KEY};
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::{IndexOutOfRange, Snapshot, SubscriptionId, Summary, TaskStore};
