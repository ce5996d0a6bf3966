// Key-value persistence with best-effort load/save

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A persistent string-to-string substrate
///
/// Implementations report failures honestly; the silent-failure policy lives
/// in [`load`] and [`save`], not here.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// Read and deserialize the value under `key`
///
/// Absent, unreadable, empty or malformed values all yield `default`.
pub fn load<T: DeserializeOwned>(storage: &dyn Storage, key: &str, default: T) -> T {
    if let Err(e) = validate_key(key) {
        warn!(key, error = ?e, "Invalid storage key, using default");
        return default;
    }

    let raw = match storage.get_item(key) {
        Ok(Some(raw)) if !raw.is_empty() => raw,
        Ok(_) => {
            debug!(key, "No stored value, using default");
            return default;
        }
        Err(e) => {
            warn!(key, error = ?e, "Failed to read stored value, using default");
            return default;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = ?e, "Failed to parse stored value, using default");
            default
        }
    }
}

/// Serialize `value` and write it under `key`
///
/// Failures are logged and dropped; the in-memory copy stays authoritative.
pub fn save<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) {
    if let Err(e) = try_save(storage, key, value) {
        warn!(key, error = ?e, "Failed to save value, persisted copy may be stale");
    }
}

fn try_save<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    validate_key(key)?;
    let json = serde_json::to_string(value).context("Failed to serialize value")?;
    storage.set_item(key, &json)?;
    debug!(key, bytes = json.len(), "Saved value");
    Ok(())
}

/// Keys double as file names, so keep them to a safe alphabet
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Storage key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid storage key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

// ============================================================================
// File substrate
// ============================================================================

/// One `<key>.json` file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Some(content))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&tmp_path)
            .context("Failed to open temp storage file for writing")?;

        // Acquire exclusive lock before truncating
        file.lock_exclusive().context("Failed to acquire file lock")?;
        file.set_len(0)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        // The live file is only replaced once the new content is on disk
        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to replace {:?}", path))?;

        // Lock is automatically released when file is dropped
        Ok(())
    }
}

// ============================================================================
// SQLite substrate
// ============================================================================

/// Key-value table inside a SQLite database
pub struct SqliteStorage {
    db: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }
        let db = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating key-value schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| eyre!("SQLite connection lock poisoned"))
    }
}

impl Storage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        let value = db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

// ============================================================================
// In-memory substrate
// ============================================================================

/// Process-local map, with switches to simulate a broken substrate
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Simulates a full quota or unavailable substrate
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items.lock().map_err(|_| eyre!("Memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(eyre!("Read failed for key {}", key));
        }
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(eyre!("Quota exceeded writing key {}", key));
        }
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Write raw text to a file, used for export artifacts
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_default() {
        let storage = MemoryStorage::new();
        let value: Vec<i64> = load(&storage, "missing", vec![7]);
        assert_eq!(value, vec![7]);
    }

    #[test]
    fn test_save_then_load() {
        let storage = MemoryStorage::new();
        save(&storage, "numbers", &vec![1, 2, 3]);

        let value: Vec<i64> = load(&storage, "numbers", Vec::new());
        assert_eq!(value, vec![1, 2, 3]);
    }

    #[test]
    fn test_load_malformed_returns_default() {
        let storage = MemoryStorage::new();
        storage.set_item("numbers", "{malformed json").unwrap();

        let value: Vec<i64> = load(&storage, "numbers", Vec::new());
        assert!(value.is_empty());
    }

    #[test]
    fn test_load_wrong_shape_returns_default() {
        let storage = MemoryStorage::new();
        storage.set_item("numbers", r#"{"not":"an array"}"#).unwrap();

        let value: Vec<i64> = load(&storage, "numbers", vec![9]);
        assert_eq!(value, vec![9]);
    }

    #[test]
    fn test_load_read_failure_returns_default() {
        let storage = MemoryStorage::new();
        save(&storage, "numbers", &vec![1]);
        storage.set_fail_reads(true);

        let value: Vec<i64> = load(&storage, "numbers", Vec::new());
        assert!(value.is_empty());
    }

    #[test]
    fn test_save_failure_is_silent() {
        let storage = MemoryStorage::new();
        save(&storage, "numbers", &vec![1]);
        storage.set_fail_writes(true);

        // Must not panic or surface an error
        save(&storage, "numbers", &vec![1, 2]);

        storage.set_fail_writes(false);
        let value: Vec<i64> = load(&storage, "numbers", Vec::new());
        assert_eq!(value, vec![1], "stale copy remains after failed save");
    }

    #[test]
    fn test_invalid_key_is_skipped() {
        let storage = MemoryStorage::new();
        save(&storage, "../escape", &vec![1]);
        assert!(storage.get_item("../escape").unwrap().is_none());

        let value: Vec<i64> = load(&storage, "../escape", vec![3]);
        assert_eq!(value, vec![3]);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("tm_tasks_v1").is_ok());
        assert!(validate_key("with-dash").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path().join("data")).unwrap();

        assert!(storage.get_item("k").unwrap().is_none());

        storage.set_item("k", "a much longer first value").unwrap();
        storage.set_item("k", "short").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("short"));
        assert!(temp.path().join("data/k.json").exists());
        assert!(!temp.path().join("data/k.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_failed_write_keeps_previous_value() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        save(&storage, "tasks", &vec!["A", "B"]);

        // A directory in place of the temp file makes the next write fail
        fs::create_dir(temp.path().join("tasks.json.tmp")).unwrap();
        assert!(storage.set_item("tasks", "[]").is_err());
        save(&storage, "tasks", &Vec::<String>::new());

        let value: Vec<String> = load(&storage, "tasks", Vec::new());
        assert_eq!(value, vec!["A", "B"]);
    }

    #[test]
    fn test_sqlite_storage_roundtrip() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("tasklist.db");

        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            storage.set_item("k", "v1").unwrap();
            storage.set_item("k", "v2").unwrap();
        }

        let storage = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v2"));
        assert!(storage.get_item("other").unwrap().is_none());
    }

    #[test]
    fn test_empty_value_treated_as_absent() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.set_item("k", "").unwrap();

        let value: Vec<i64> = load(&storage, "k", vec![4]);
        assert_eq!(value, vec![4]);
    }
}
