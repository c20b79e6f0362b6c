//! Task Status and Results
//!
//! `TaskStatus` is the mutable collector a module writes counters and
//! progress into while it runs. `TaskResult` is the immutable record the
//! runner builds from it once the task has finished; every field is set at
//! construction and the result cannot be assembled piecemeal.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::context::TaskContext;

/// Mutable per-task status a module reports into during execution.
#[derive(Debug, Default)]
pub struct TaskStatus {
    counters: HashMap<String, u64>,
    description: Option<String>,
    progress: f64,
}

impl TaskStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to a named counter, creating it at zero if needed.
    pub fn increment_counter(&mut self, name: &str, amount: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    /// Sets a named counter.
    pub fn set_counter(&mut self, name: &str, value: u64) {
        self.counters.insert(name.to_string(), value);
    }

    /// Returns the value of a counter.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    /// Sets a human-readable description of what the task is doing.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Sets the task progress, clamped to `0.0..=1.0`.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.clamp(0.0, 1.0);
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    fn into_counters(self) -> HashMap<String, u64> {
        self.counters
    }
}

/// Immutable record of one executed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    task_id: u64,
    step_id: String,
    context_name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_ms: u64,
    success: bool,
    counters: HashMap<String, u64>,
    error_message: Option<String>,
}

impl TaskResult {
    /// Builds the result of a successful task.
    pub(crate) fn success(
        context: &TaskContext,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id: context.id(),
            step_id: context.step_id().to_string(),
            context_name: context.context_name().to_string(),
            start_time,
            end_time,
            duration_ms: duration_ms(start_time, end_time),
            success: true,
            counters: status.into_counters(),
            error_message: None,
        }
    }

    /// Builds the result of a failed task.
    pub(crate) fn failure(
        context: &TaskContext,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        status: TaskStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: context.id(),
            step_id: context.step_id().to_string(),
            context_name: context.context_name().to_string(),
            start_time,
            end_time,
            duration_ms: duration_ms(start_time, end_time),
            success: false,
            counters: status.into_counters(),
            error_message: Some(message.into()),
        }
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn counters(&self) -> &HashMap<String, u64> {
        &self.counters
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Writes the result as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a result back from JSON.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::test_context;

    #[test]
    fn test_status_counters() {
        let mut status = TaskStatus::new();
        status.increment_counter("reads", 100);
        status.increment_counter("reads", 50);
        status.set_counter("mapped", 75);

        assert_eq!(status.counter("reads"), Some(150));
        assert_eq!(status.counter("mapped"), Some(75));
        assert_eq!(status.counter("missing"), None);
    }

    #[test]
    fn test_status_progress_is_clamped() {
        let mut status = TaskStatus::new();
        status.set_progress(2.0);
        assert_eq!(status.progress(), 1.0);

        status.set_progress(-1.0);
        assert_eq!(status.progress(), 0.0);
    }

    #[test]
    fn test_success_result() {
        let context = test_context();
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(120);

        let mut status = TaskStatus::new();
        status.set_counter("reads", 42);

        let result = TaskResult::success(&context, start, end, status);

        assert!(result.is_success());
        assert_eq!(result.duration(), Duration::from_millis(120));
        assert_eq!(result.counters().get("reads"), Some(&42));
        assert!(result.error_message().is_none());
        assert_eq!(result.task_id(), context.id());
    }

    #[test]
    fn test_failure_result() {
        let context = test_context();
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(5);

        let result =
            TaskResult::failure(&context, start, end, TaskStatus::new(), "module exploded");

        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("module exploded"));
    }

    #[test]
    fn test_result_save_and_load() {
        use tempfile::tempdir;

        let context = test_context();
        let start = Utc::now();
        let result = TaskResult::success(&context, start, start, TaskStatus::new());

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("task.result");
        result.save(&path).unwrap();

        let loaded = TaskResult::load(&path).unwrap();
        assert_eq!(loaded.task_id(), result.task_id());
        assert!(loaded.is_success());
    }
}
