//! Engine Error Types
//!
//! All configuration-time and illegal-state errors raised by the engine.
//! Task execution failures are deliberately *not* errors: they are captured
//! as failed task results so that execution never unwinds across the
//! scheduler boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by workflow construction, configuration and task plumbing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("step '{0}' already exists in the workflow")]
    DuplicateStepId(String),

    #[error("invalid step id '{0}': ids must start with a letter and contain only lowercase letters, digits, '_' or '-'")]
    InvalidStepId(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{0}' is already registered")]
    DuplicateModule(String),

    #[error("module '{module}' failed to configure: {message}")]
    ModuleConfiguration { module: String, message: String },

    #[error("invalid port name '{0}': names must start with a letter and contain only lowercase letters, digits or '_'")]
    InvalidPortName(String),

    #[error("step '{step}' declares duplicate port '{port}'")]
    DuplicatePort { step: String, port: String },

    #[error("step '{step}' has no port named '{port}'")]
    UnknownPort { step: String, port: String },

    #[error("cannot link '{from}.{output}' to '{to}.{input}': {reason}")]
    IncompatibleLink {
        from: String,
        output: String,
        to: String,
        input: String,
        reason: String,
    },

    #[error("terminal step '{0}' cannot feed downstream steps")]
    TerminalStepLinked(String),

    #[error("step '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("adding dependency of '{step}' on '{dependency}' would create a cycle")]
    CyclicDependency { step: String, dependency: String },

    #[error("skip flag is only settable on generator steps (step '{0}')")]
    SkipNotAllowed(String),

    #[error("step '{step}' requires {required} processors but the host has {available}")]
    InsufficientProcessors {
        step: String,
        required: u32,
        available: u32,
    },

    #[error("step '{step}' requires {required} MB of memory but the host has {available} MB")]
    InsufficientMemory {
        step: String,
        required: u64,
        available: u64,
    },

    #[error("the root step is created implicitly and cannot be added")]
    RootStepExplicit,

    #[error("workflow is not configured")]
    NotConfigured,

    #[error("workflow is already configured")]
    AlreadyConfigured,

    #[error("task {0} has already been executed")]
    TaskAlreadyExecuted(u64),

    #[error("task {0} has not been executed yet")]
    TaskNotExecuted(u64),

    #[error("tokens for task {0} have already been sent")]
    TokensAlreadySent(u64),

    #[error("end-of-step tokens carry no data")]
    EndTokenHasNoData,

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("workflow stalled: steps {0:?} are waiting but no work is in flight")]
    Stalled(Vec<String>),

    #[error("task context file not found: {}", .0.display())]
    ContextFileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_step() {
        let err = EngineError::DuplicateStepId("mapping".to_string());
        assert!(err.to_string().contains("mapping"));

        let err = EngineError::StepFailed {
            step: "filter".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("filter"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_link_error_message() {
        let err = EngineError::IncompatibleLink {
            from: "a".to_string(),
            output: "out".to_string(),
            to: "b".to_string(),
            input: "in".to_string(),
            reason: "format mismatch".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.out"));
        assert!(msg.contains("b.in"));
        assert!(msg.contains("format mismatch"));
    }
}
