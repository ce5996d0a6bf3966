// Append-only analytics event log

use crate::models::{AnalyticsEvent, new_id, now_ms};
use crate::record::{Record, load_collection, save_collection};
use crate::storage::{self, Storage};
use eyre::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the exported log
pub const EXPORT_FILE_NAME: &str = "tm_analytics.json";

/// Records notable actions for later export
///
/// One instance is opened per session and passed to whoever needs to record
/// events. The log is unbounded; the only way to shrink it is [`EventLog::clear`].
pub struct EventLog {
    storage: Arc<dyn Storage>,
    events: Vec<AnalyticsEvent>,
}

impl EventLog {
    /// Open the log, hydrating from storage once (empty if nothing is stored)
    pub fn open(storage: Arc<dyn Storage>) -> Self {
        let events: Vec<AnalyticsEvent> = load_collection(storage.as_ref());
        info!(count = events.len(), "Loaded analytics events");
        Self { storage, events }
    }

    /// Append an event and persist the full log
    pub fn log_event(&mut self, name: &str, payload: Option<Value>) -> AnalyticsEvent {
        // Keep timestamps non-decreasing even if the clock steps back
        let floor = self.events.last().map(Record::timestamp).unwrap_or(i64::MIN);
        let event = AnalyticsEvent {
            id: new_id(),
            event: name.to_string(),
            timestamp: now_ms().max(floor),
            payload,
        };
        debug!(id = %event.id, event = name, "log_event");

        self.events.push(event.clone());
        save_collection(self.storage.as_ref(), self.events.as_slice());
        event
    }

    pub fn events(&self) -> &[AnalyticsEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Pretty-printed JSON array of every event, in log order
    pub fn export_json(&self) -> Vec<u8> {
        match serde_json::to_vec_pretty(&self.events) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = ?e, "Failed to serialize analytics log");
                b"[]".to_vec()
            }
        }
    }

    /// Write the export artifact into `dir`, returning its path
    pub fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).context("Failed to create export directory")?;
        let path = dir.join(EXPORT_FILE_NAME);
        storage::write_file(&path, &self.export_json())?;
        info!(path = ?path, count = self.events.len(), "Exported analytics log");
        Ok(path)
    }

    /// Drop every event
    pub fn clear(&mut self) {
        info!(count = self.events.len(), "Clearing analytics log");
        self.events.clear();
        save_collection(self.storage.as_ref(), self.events.as_slice());
    }
}
