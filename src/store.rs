// Ordered task collection with snapshot persistence and observers

use crate::models::{NewTask, Task, TaskPatch, now_ms};
use crate::record::{load_collection, save_collection};
use crate::storage::Storage;
use eyre::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable view of the task sequence, in display order
///
/// Every mutation produces a new snapshot; holders of an older one keep
/// seeing the state they were handed.
pub type Snapshot = Arc<[Task]>;

/// Callback invoked synchronously after each mutation
pub type Observer = Box<dyn FnMut(&Snapshot)>;

/// Handle returned by [`TaskStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A reorder index that does not address an element of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

impl fmt::Display for IndexOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Index {} out of range for {} tasks", self.index, self.len)
    }
}

impl std::error::Error for IndexOutOfRange {}

/// Aggregate counts for the admin view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    pub open: usize,
    pub high_priority: usize,
}

/// In-memory ordered task list mirrored to storage on every mutation
pub struct TaskStore {
    storage: Arc<dyn Storage>,
    tasks: Snapshot,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl TaskStore {
    /// Open the store, hydrating from storage once (empty if nothing is stored)
    pub fn open(storage: Arc<dyn Storage>) -> Self {
        let tasks: Vec<Task> = load_collection(storage.as_ref());
        info!(count = tasks.len(), "Loaded tasks");

        Self {
            storage,
            tasks: tasks.into(),
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Current snapshot, in display order
    pub fn tasks(&self) -> Snapshot {
        Arc::clone(&self.tasks)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Position of a task in the underlying sequence
    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn summary(&self) -> Summary {
        let completed = self.tasks.iter().filter(|t| t.done).count();
        Summary {
            total: self.tasks.len(),
            completed,
            open: self.tasks.len() - completed,
            high_priority: self.tasks.iter().filter(|t| t.is_high_priority()).count(),
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn subscribe(&mut self, observer: impl FnMut(&Snapshot) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a task and insert it at the front of the list
    pub fn add_task(&mut self, payload: NewTask) -> Task {
        let task = Task::new(payload, now_ms());
        debug!(id = %task.id, title = %task.title, "add_task");

        let mut next = Vec::with_capacity(self.tasks.len() + 1);
        next.push(task.clone());
        next.extend(self.tasks.iter().cloned());
        self.commit(next);

        task
    }

    /// Merge `patch` into the task with `id`
    ///
    /// Unknown ids leave the store untouched. Returns whether a task matched.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> bool {
        let Some(index) = self.position(id) else {
            debug!(id, "update_task: no such task");
            return false;
        };

        let mut next = self.tasks.to_vec();
        let task = &mut next[index];
        task.apply(patch);
        // Strictly after the previous stamp even within the same millisecond
        task.updated_at = now_ms().max(task.updated_at.saturating_add(1));
        debug!(id, updated_at = task.updated_at, "update_task");

        self.commit(next);
        true
    }

    /// Remove the task with `id`. Returns whether a task matched.
    pub fn delete_task(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            debug!(id, "delete_task: no such task");
            return false;
        };

        let mut next = self.tasks.to_vec();
        next.remove(index);
        debug!(id, "delete_task");

        self.commit(next);
        true
    }

    /// Move the element at `from` so it ends up at `to`
    ///
    /// Indices address the full underlying sequence, not a filtered view.
    /// This is a remove-then-insert move, not a swap, and leaves
    /// `updated_at` alone.
    pub fn reorder_tasks(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.tasks.len();
        for index in [from, to] {
            if index >= len {
                return Err(IndexOutOfRange { index, len }.into());
            }
        }

        let mut next = self.tasks.to_vec();
        let moved = next.remove(from);
        next.insert(to, moved);
        debug!(from, to, "reorder_tasks");

        self.commit(next);
        Ok(())
    }

    /// Remove every task
    pub fn clear_all(&mut self) {
        info!(count = self.tasks.len(), "Clearing all tasks");
        self.commit(Vec::new());
    }

    /// Install a new snapshot, persist it, then notify observers
    ///
    /// Observers only ever see the finished snapshot. They cannot reach the
    /// store while being notified, so a mutation cannot start mid-notification.
    fn commit(&mut self, next: Vec<Task>) {
        self.tasks = next.into();
        save_collection(self.storage.as_ref(), &self.tasks[..]);

        let snapshot = Arc::clone(&self.tasks);
        for (_, observer) in self.observers.iter_mut() {
            observer(&snapshot);
        }
    }
}
