//! Per-Task Log Files
//!
//! Each task can own a dedicated log file under its step's task directory,
//! so concurrent tasks never interleave their output. The writer is owned
//! by a single task runner and is not shared across threads.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::EngineError;

use super::context::TaskContext;

/// Timestamped line writer for one task.
#[derive(Debug)]
pub struct TaskLogger {
    path: PathBuf,
    file: File,
}

impl TaskLogger {
    /// Creates the task directory and opens this task's log file.
    pub fn create(context: &TaskContext) -> Result<Self, EngineError> {
        let path = context.log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an informational line.
    pub fn info(&mut self, message: &str) {
        self.write_line("INFO", message);
    }

    /// Writes an error line.
    pub fn error(&mut self, message: &str) {
        self.write_line("ERROR", message);
    }

    fn write_line(&mut self, level: &str, message: &str) {
        let line = format!("[{}] [{}] {}\n", Utc::now().to_rfc3339(), level, message);
        // A failed log write must not fail the task itself.
        let _ = self.file.write_all(line.as_bytes());
    }
}
