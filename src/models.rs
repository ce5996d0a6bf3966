// Data models for the task list

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Priority assigned when a new task does not specify one
pub const DEFAULT_PRIORITY: i64 = 1;

/// Priorities at or above this value are presented as high
pub const HIGH_PRIORITY: i64 = 3;

/// A trackable unit of work
///
/// Stored in camelCase so the persisted array matches the browser layout
/// (`createdAt`, `updatedAt`, `dueDate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl Task {
    /// Build a fresh task from a creation payload
    pub fn new(payload: NewTask, now: i64) -> Self {
        Self {
            id: new_id(),
            title: payload.title,
            description: payload.description,
            done: false,
            priority: payload.priority.unwrap_or(DEFAULT_PRIORITY),
            created_at: now,
            updated_at: now,
            due_date: payload.due_date,
        }
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority >= HIGH_PRIORITY
    }

    /// Merge a patch over this task. Identity and timestamps are left alone.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date = due_date.clone();
        }
    }
}

/// Payload for creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

/// Partial update for a task
///
/// `description` and `due_date` are doubly optional: `Some(None)` clears the
/// field, `None` leaves it untouched. Serialized into `task_updated` event
/// payloads, where a cleared field shows up as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<String>>,
}

impl TaskPatch {
    pub fn done(done: bool) -> Self {
        Self {
            done: Some(done),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Immutable record of a notable action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub event: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a fresh opaque identifier
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
