//! Run Settings
//!
//! Process-wide settings shared by every task of a run. The record is a
//! small set of typed entries plus a free-form key/value map, and it is
//! serialized alongside each task context so an out-of-process task
//! executor starts from the same configuration as the submitting process.
//!
//! Loading a serialized task context *replaces* the global settings as a
//! side effect; see `execution::context`.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Global settings for the current process.
static GLOBAL_SETTINGS: Lazy<RwLock<Settings>> = Lazy::new(|| RwLock::new(Settings::default()));

/// Settings shared by all tasks of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory used for temporary files (generated scripts, staging).
    temp_directory: PathBuf,

    /// Free-form entries, keys normalized to lowercase.
    entries: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_directory: env::temp_dir(),
            entries: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the temporary directory.
    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }

    /// Sets the temporary directory.
    pub fn set_temp_directory(&mut self, dir: impl Into<PathBuf>) {
        self.temp_directory = dir.into();
    }

    /// Returns the value of a free-form entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&normalize_key(key))
            .map(String::as_str)
    }

    /// Sets a free-form entry. Keys are trimmed and lowercased.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(normalize_key(key), value.into());
    }

    /// Returns the number of free-form entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no free-form entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of the process-global settings.
    pub fn current() -> Settings {
        GLOBAL_SETTINGS.read().unwrap().clone()
    }

    /// Replaces the process-global settings wholesale.
    ///
    /// Called when a serialized task context is loaded, so that the task
    /// runs under the configuration of the process that created it.
    pub fn replace(settings: Settings) {
        *GLOBAL_SETTINGS.write().unwrap() = settings;
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Serializes tests that mutate the process-global settings.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
