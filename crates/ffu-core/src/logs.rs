//! Read-only access to log files written by the updater.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::config::LogConfig;
use crate::error::LogError;

/// Lists and reads `<prefix>*.<extension>` files in the log directory.
#[derive(Debug, Clone)]
pub struct LogRegistry {
    config: LogConfig,
}

impl LogRegistry {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// List log files, most recently modified first.
    ///
    /// Files with equal modification times are ordered by name, descending.
    /// A missing log directory yields an empty list.
    pub fn list_log_files(&self) -> Result<Vec<PathBuf>, LogError> {
        let entries = match std::fs::read_dir(&self.config.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Log directory {:?} does not exist", self.config.dir);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut logs: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| self.config.is_log_name(n))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            logs.push((metadata.modified()?, path));
        }

        logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(logs.into_iter().map(|(_, path)| path).collect())
    }

    /// The most recently modified log file, if any.
    pub fn latest_log(&self) -> Result<Option<PathBuf>, LogError> {
        Ok(self.list_log_files()?.into_iter().next())
    }

    /// Read a log file by its bare file name.
    ///
    /// Names that are not plain `<prefix>*.<extension>` file names are
    /// treated as not found.
    pub fn read_log(&self, name: &str) -> Result<String, LogError> {
        if name.contains("..") || !self.config.is_log_name(name) {
            return Err(LogError::NotFound(name.to_string()));
        }

        let path = self.config.dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LogError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
