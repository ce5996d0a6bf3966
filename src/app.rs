// Session wiring: task actions plus the analytics events they record

use crate::analytics::EventLog;
use crate::filter::{FilteredView, TaskQuery};
use crate::models::{NewTask, Task, TaskPatch};
use crate::store::{Summary, TaskStore};
use eyre::{Result, eyre};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::storage::Storage;

/// A task list session
///
/// Owns the task store and the event log for the lifetime of the session and
/// records an event after each user-visible action.
pub struct App {
    store: TaskStore,
    log: EventLog,
    log_events: bool,
}

impl App {
    pub fn new(store: TaskStore, log: EventLog) -> Self {
        Self {
            store,
            log,
            log_events: true,
        }
    }

    /// Open both components on the same storage
    pub fn open(storage: Arc<dyn Storage>) -> Self {
        let store = TaskStore::open(Arc::clone(&storage));
        let log = EventLog::open(storage);
        Self::new(store, log)
    }

    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn summary(&self) -> Summary {
        self.store.summary()
    }

    fn record(&mut self, name: &str, payload: Value) {
        if self.log_events {
            self.log.log_event(name, Some(payload));
        }
    }

    // ========================================================================
    // Task actions
    // ========================================================================

    pub fn add_task(&mut self, payload: NewTask) -> Task {
        let task = self.store.add_task(payload);
        self.record("task_created", json!({ "id": task.id, "title": task.title }));
        task
    }

    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> bool {
        let found = self.store.update_task(id, patch);
        if found {
            self.record("task_updated", json!({ "id": id, "patch": patch }));
        }
        found
    }

    /// Flip the completion flag, returning the new value
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let done = !self.store.get(id)?.done;
        self.store.update_task(id, &TaskPatch::done(done));
        self.record("task_toggled", json!({ "id": id, "done": done }));
        Some(done)
    }

    pub fn set_done(&mut self, id: &str, done: bool) -> bool {
        let found = self.store.update_task(id, &TaskPatch::done(done));
        if found {
            self.record("task_toggled", json!({ "id": id, "done": done }));
        }
        found
    }

    pub fn delete_task(&mut self, id: &str) -> bool {
        let found = self.store.delete_task(id);
        if found {
            self.record("task_deleted", json!({ "id": id }));
        }
        found
    }

    /// Move by underlying-sequence indices
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.store.reorder_tasks(from, to)?;
        self.record("task_reordered", json!({ "fromIndex": from, "toIndex": to }));
        Ok(())
    }

    /// Move a task one step towards the front. Returns whether it moved.
    pub fn move_up(&mut self, id: &str) -> Result<bool> {
        let Some(from) = self.store.position(id) else {
            return Ok(false);
        };
        let to = from.saturating_sub(1);
        self.move_between(from, to)
    }

    /// Move a task one step towards the back. Returns whether it moved.
    pub fn move_down(&mut self, id: &str) -> Result<bool> {
        let Some(from) = self.store.position(id) else {
            return Ok(false);
        };
        let to = (from + 1).min(self.store.len() - 1);
        self.move_between(from, to)
    }

    fn move_between(&mut self, from: usize, to: usize) -> Result<bool> {
        if from == to {
            return Ok(false);
        }
        self.reorder(from, to)?;
        Ok(true)
    }

    /// Drag the task shown at `from_view` onto the one at `to_view`
    ///
    /// Positions are within the view filtered by `query`; they are translated
    /// to underlying indices before reordering. Returns whether anything moved.
    pub fn move_in_view(&mut self, query: &str, from_view: usize, to_view: usize) -> Result<bool> {
        let tasks = self.store.tasks();
        let view = FilteredView::new(&tasks, &TaskQuery::new(query));

        let (Some(from), Some(to)) = (view.underlying_index(from_view), view.underlying_index(to_view)) else {
            debug!(from_view, to_view, "move_in_view: position outside view");
            return Ok(false);
        };
        if from == to {
            return Ok(false);
        }

        let from_id = tasks[from].id.clone();
        let to_id = tasks[to].id.clone();
        self.store.reorder_tasks(from, to)?;
        self.record("task_reordered", json!({ "fromId": from_id, "toId": to_id }));
        Ok(true)
    }

    pub fn clear_all(&mut self) {
        self.store.clear_all();
        self.record("data_cleared", json!({}));
    }

    pub fn export_log(&self, dir: &Path) -> Result<PathBuf> {
        self.log.export_to(dir)
    }

    /// Resolve a full id, or a unique prefix or suffix of one
    pub fn resolve_id(&self, needle: &str) -> Result<String> {
        let tasks = self.store.tasks();
        if let Some(task) = tasks.iter().find(|t| t.id == needle) {
            return Ok(task.id.clone());
        }
        if needle.is_empty() {
            return Err(eyre!("Task id cannot be empty"));
        }

        let by_prefix: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(needle)).collect();
        let candidates = if by_prefix.is_empty() {
            tasks.iter().filter(|t| t.id.ends_with(needle)).collect()
        } else {
            by_prefix
        };

        match candidates.as_slice() {
            [task] => Ok(task.id.clone()),
            [] => Err(eyre!("No task matches id {}", needle)),
            _ => Err(eyre!("Id {} is ambiguous ({} tasks match)", needle, candidates.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn app_with(titles: &[&str]) -> App {
        let mut app = App::open(Arc::new(MemoryStorage::new())).with_event_logging(false);
        for title in titles.iter().rev() {
            app.add_task(NewTask::titled(*title));
        }
        app.with_event_logging(true)
    }

    fn titles(app: &App) -> Vec<String> {
        app.store().tasks().iter().map(|t| t.title.clone()).collect()
    }

    fn event_names(app: &App) -> Vec<String> {
        app.log().events().iter().map(|e| e.event.clone()).collect()
    }

    #[test]
    fn test_add_records_created_event() {
        let mut app = app_with(&[]);
        let task = app.add_task(NewTask::titled("A"));

        let events = app.log().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "task_created");
        assert_eq!(events[0].payload, Some(json!({"id": task.id, "title": "A"})));
    }

    #[test]
    fn test_toggle_flips_done() {
        let mut app = app_with(&["A"]);
        let id = app.store().tasks()[0].id.clone();

        assert_eq!(app.toggle(&id), Some(true));
        assert_eq!(app.toggle(&id), Some(false));
        assert_eq!(app.toggle("missing"), None);
        assert_eq!(event_names(&app), vec!["task_toggled", "task_toggled"]);
    }

    #[test]
    fn test_unknown_ids_record_nothing() {
        let mut app = app_with(&["A"]);
        assert!(!app.update_task("missing", &TaskPatch::title("x")));
        assert!(!app.delete_task("missing"));
        assert!(!app.set_done("missing", true));
        assert!(app.log().is_empty());
    }

    #[test]
    fn test_update_records_patch() {
        let mut app = app_with(&["A"]);
        let id = app.store().tasks()[0].id.clone();
        assert!(app.update_task(&id, &TaskPatch::title("B")));

        let event = &app.log().events()[0];
        assert_eq!(event.event, "task_updated");
        assert_eq!(event.payload, Some(json!({"id": id, "patch": {"title": "B"}})));
    }

    #[test]
    fn test_move_up_and_down_clamp_at_ends() {
        let mut app = app_with(&["A", "B", "C"]);
        let a = app.store().tasks()[0].id.clone();
        let c = app.store().tasks()[2].id.clone();

        assert!(!app.move_up(&a).unwrap());
        assert!(!app.move_down(&c).unwrap());
        assert!(app.log().is_empty());

        assert!(app.move_down(&a).unwrap());
        assert_eq!(titles(&app), vec!["B", "A", "C"]);
        assert!(app.move_up(&c).unwrap());
        assert_eq!(titles(&app), vec!["B", "C", "A"]);
        assert!(!app.move_up("missing").unwrap());
    }

    #[test]
    fn test_move_in_view_translates_indices() {
        let mut app = app_with(&["milk", "bread", "oat milk", "eggs", "milk shake"]);

        // View for "milk" is [milk, oat milk, milk shake] at underlying 0, 2, 4
        assert!(app.move_in_view("milk", 2, 0).unwrap());
        assert_eq!(titles(&app), vec!["milk shake", "milk", "bread", "oat milk", "eggs"]);

        let event = app.log().events().last().unwrap();
        assert_eq!(event.event, "task_reordered");
    }

    #[test]
    fn test_move_in_view_outside_or_same_is_noop() {
        let mut app = app_with(&["milk", "bread"]);
        assert!(!app.move_in_view("milk", 0, 1).unwrap());
        assert!(!app.move_in_view("", 1, 1).unwrap());
        assert_eq!(titles(&app), vec!["milk", "bread"]);
        assert!(app.log().is_empty());
    }

    #[test]
    fn test_reorder_out_of_range_records_nothing() {
        let mut app = app_with(&["A"]);
        assert!(app.reorder(0, 3).is_err());
        assert!(app.log().is_empty());
    }

    #[test]
    fn test_clear_all_records_event() {
        let mut app = app_with(&["A", "B"]);
        app.clear_all();
        assert!(app.store().is_empty());
        assert_eq!(event_names(&app), vec!["data_cleared"]);
        assert_eq!(app.summary(), Summary::default());
    }

    #[test]
    fn test_disabled_event_logging() {
        let mut app = app_with(&[]).with_event_logging(false);
        app.add_task(NewTask::titled("A"));
        assert!(app.log().is_empty());
    }

    #[test]
    fn test_resolve_id() {
        let app = app_with(&["A", "B"]);
        let tasks = app.store().tasks();
        let full = tasks[0].id.clone();

        assert_eq!(app.resolve_id(&full).unwrap(), full);
        let suffix = &full[full.len() - 12..];
        assert_eq!(app.resolve_id(suffix).unwrap(), full);
        assert!(app.resolve_id("").is_err());
        assert!(app.resolve_id("zzzz").is_err());
    }
}
