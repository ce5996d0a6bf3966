// Application configuration

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::storage::{FileStorage, SqliteStorage, Storage};

/// Storage substrate to persist state in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per key
    #[default]
    File,
    /// Key-value table in `tasklist.db`
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where state is stored (default: platform data dir)
    pub data_dir: Option<PathBuf>,
    pub backend: Backend,
    /// Where `export` writes `tm_analytics.json` (default: current directory)
    pub export_dir: Option<PathBuf>,
    /// Record analytics events for task actions
    pub log_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            backend: Backend::File,
            export_dir: None,
            log_events: true,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
        debug!(path = ?path, ?config, "Loaded config");
        Ok(config)
    }

    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("tasklist"))
                .ok_or_else(|| eyre!("Could not determine a data directory; set data_dir in the config")),
        }
    }

    pub fn resolved_export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Open the configured storage substrate
    pub fn open_storage(&self) -> Result<Arc<dyn Storage>> {
        let dir = self.resolved_data_dir()?;
        let storage: Arc<dyn Storage> = match self.backend {
            Backend::File => Arc::new(FileStorage::open(&dir)?),
            Backend::Sqlite => Arc::new(SqliteStorage::open(dir.join("tasklist.db"))?),
        };
        debug!(dir = ?dir, backend = ?self.backend, "Opened storage");
        Ok(storage)
    }
}

/// `<config dir>/tasklist/tasklist.yml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tasklist").join("tasklist.yml"))
}
