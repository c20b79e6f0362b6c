//! Task Runner
//!
//! Executes exactly one task in its own thread and converts every outcome
//! into a `TaskResult`. Module errors, panics and thread failures never
//! escape `run()`: from the scheduler's point of view task execution is
//! exception-safe, and exactly one result object is always produced.
//!
//! The runner blocks its caller until the execution thread has terminated,
//! so the dispatching thread owns the full lifetime of its task.

use std::any::Any;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use log::debug;

use crate::error::EngineError;
use crate::module::Module;
use crate::workflow::graph::GraphInner;
use crate::workflow::state::StepState;
use crate::workflow::step::StepIndex;

use super::context::TaskContext;
use super::logger::TaskLogger;
use super::result::{TaskResult, TaskStatus};
use super::token::Token;

/// The module instance a task runs against: either the step's shared,
/// already-configured instance, or a fresh instance configured for this
/// task alone.
pub(crate) enum ModuleInstance {
    Shared(Arc<dyn Module>),
    Fresh(Box<dyn Module>),
}

impl ModuleInstance {
    fn execute(
        &self,
        context: &TaskContext,
        status: &mut TaskStatus,
    ) -> Result<(), crate::module::ModuleError> {
        match self {
            Self::Shared(module) => module.execute(context, status),
            Self::Fresh(module) => module.execute(context, status),
        }
    }
}

/// Runs one task and drives its token emission.
pub struct TaskRunner {
    context: Arc<TaskContext>,
    module: Option<ModuleInstance>,
    result: Option<TaskResult>,
    tokens_sent: bool,
}

impl TaskRunner {
    /// Creates a runner around a fresh module instance. The instance must
    /// already be configured.
    pub fn new(context: TaskContext, module: Box<dyn Module>) -> Self {
        Self::from_instance(context, ModuleInstance::Fresh(module))
    }

    pub(crate) fn from_instance(context: TaskContext, module: ModuleInstance) -> Self {
        Self {
            context: Arc::new(context),
            module: Some(module),
            result: None,
            tokens_sent: false,
        }
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Returns the task result once `run()` has completed.
    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    /// Executes the task. Calling this twice on the same runner is an
    /// illegal-state error.
    ///
    /// The module runs in a dedicated thread; the call returns once that
    /// thread has terminated, with every failure mode captured in the
    /// returned result rather than propagated.
    pub fn run(&mut self) -> Result<&TaskResult, EngineError> {
        let task_id = self.context.id();

        if self.result.is_some() {
            return Err(EngineError::TaskAlreadyExecuted(task_id));
        }
        let module = self
            .module
            .take()
            .ok_or(EngineError::TaskAlreadyExecuted(task_id))?;

        let mut logger = if self.context.creates_log() {
            Some(TaskLogger::create(&self.context)?)
        } else {
            None
        };

        debug!(
            "Running task {} ({}) of step '{}'",
            task_id,
            self.context.context_name(),
            self.context.step_id()
        );
        if let Some(logger) = logger.as_mut() {
            logger.info(&format!(
                "Starting task {} ({}) of step '{}'",
                task_id,
                self.context.context_name(),
                self.context.step_id()
            ));
        }

        let start_time = Utc::now();
        let context = Arc::clone(&self.context);

        let handle = thread::Builder::new()
            .name(format!("task-{}", task_id))
            .spawn(move || {
                let mut status = TaskStatus::new();
                let outcome = module
                    .execute(&context, &mut status)
                    .map_err(|e| e.to_string());
                (status, outcome)
            });

        let result = match handle {
            Err(e) => TaskResult::failure(
                &self.context,
                start_time,
                Utc::now(),
                TaskStatus::new(),
                format!(
                    "step produced no result object (failed to start execution thread: {})",
                    e
                ),
            ),
            Ok(handle) => match handle.join() {
                Ok((status, Ok(()))) => {
                    TaskResult::success(&self.context, start_time, Utc::now(), status)
                }
                Ok((status, Err(message))) => {
                    TaskResult::failure(&self.context, start_time, Utc::now(), status, message)
                }
                Err(panic) => TaskResult::failure(
                    &self.context,
                    start_time,
                    Utc::now(),
                    TaskStatus::new(),
                    format!("module panicked: {}", panic_message(&panic)),
                ),
            },
        };

        if let Some(logger) = logger.as_mut() {
            if result.is_success() {
                logger.info(&format!(
                    "Task {} finished in {:?}",
                    task_id,
                    result.duration()
                ));
            } else {
                logger.error(&format!(
                    "Task {} failed: {}",
                    task_id,
                    result.error_message().unwrap_or("unknown error")
                ));
            }
        }

        Ok(self.result.insert(result))
    }

    /// Emits this task's output tokens, exactly once, after `run()`.
    ///
    /// A failed task emits nothing. After the first successful task of a
    /// step still in WORKING state, the step moves to PARTIALLY_DONE.
    pub(crate) fn send_tokens(
        &mut self,
        graph: &Arc<GraphInner>,
        index: StepIndex,
    ) -> Result<(), EngineError> {
        let task_id = self.context.id();

        if self.tokens_sent {
            return Err(EngineError::TokensAlreadySent(task_id));
        }
        let success = self
            .result
            .as_ref()
            .ok_or(EngineError::TaskNotExecuted(task_id))?
            .is_success();
        self.tokens_sent = true;

        if !success {
            return Ok(());
        }

        let step = graph.step(index);
        for port in step.output_ports() {
            if let Some(data) = self.context.output_data(port.name()) {
                GraphInner::send_token(
                    graph,
                    index,
                    port.name(),
                    Token::data_token(index, port.name(), data.clone()),
                );
            }
        }

        let machine = graph.machine(index);
        if machine.current() == StepState::Working {
            machine.set_state(graph, StepState::PartiallyDone);
        }

        Ok(())
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::tests::test_context;
    use crate::execution::result::TaskStatus;
    use crate::module::{ModuleError, ParameterSet};
    use std::collections::HashMap;

    struct OkModule;

    impl Module for OkModule {
        fn configure(&mut self, _parameters: &ParameterSet) -> Result<(), ModuleError> {
            Ok(())
        }

        fn execute(
            &self,
            _context: &TaskContext,
            status: &mut TaskStatus,
        ) -> Result<(), ModuleError> {
            status.set_counter("processed", 1);
            Ok(())
        }
    }

    struct FailingModule;

    impl Module for FailingModule {
        fn configure(&mut self, _parameters: &ParameterSet) -> Result<(), ModuleError> {
            Ok(())
        }

        fn execute(
            &self,
            _context: &TaskContext,
            _status: &mut TaskStatus,
        ) -> Result<(), ModuleError> {
            Err("intentional failure".into())
        }
    }

    struct PanickingModule;

    impl Module for PanickingModule {
        fn configure(&mut self, _parameters: &ParameterSet) -> Result<(), ModuleError> {
            Ok(())
        }

        fn execute(
            &self,
            _context: &TaskContext,
            _status: &mut TaskStatus,
        ) -> Result<(), ModuleError> {
            panic!("module blew up");
        }
    }

    fn quiet_context() -> TaskContext {
        use crate::module::ModuleCapabilities;
        use crate::workflow::step::{Step, StepType};

        // No log file: these tests give the step no task directory.
        let step = Step::new(
            "quietstep",
            StepType::Standard,
            "shell",
            ParameterSet::new(),
            ModuleCapabilities {
                no_log: true,
                ..ModuleCapabilities::default()
            },
        );
        TaskContext::new(&step, HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_run_produces_success_result() {
        let mut runner = TaskRunner::new(quiet_context(), Box::new(OkModule));
        let result = runner.run().unwrap();

        assert!(result.is_success());
        assert_eq!(result.counters().get("processed"), Some(&1));
    }

    #[test]
    fn test_run_twice_is_illegal() {
        let mut runner = TaskRunner::new(quiet_context(), Box::new(OkModule));
        runner.run().unwrap();

        assert!(matches!(
            runner.run(),
            Err(EngineError::TaskAlreadyExecuted(_))
        ));
    }

    #[test]
    fn test_module_error_is_contained() {
        let mut runner = TaskRunner::new(quiet_context(), Box::new(FailingModule));
        let result = runner.run().unwrap();

        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("intentional failure"));
    }

    #[test]
    fn test_module_panic_is_contained() {
        let mut runner = TaskRunner::new(quiet_context(), Box::new(PanickingModule));
        let result = runner.run().unwrap();

        assert!(!result.is_success());
        let message = result.error_message().unwrap();
        assert!(message.contains("module panicked"));
        assert!(message.contains("module blew up"));
    }

    #[test]
    fn test_result_accessor_before_and_after_run() {
        let mut runner = TaskRunner::new(quiet_context(), Box::new(OkModule));
        assert!(runner.result().is_none());

        runner.run().unwrap();
        assert!(runner.result().is_some());
    }

    #[test]
    fn test_run_writes_task_log() {
        use tempfile::tempdir;

        use crate::workflow::step::{Step, StepType};
        use crate::module::ModuleCapabilities;

        let temp_dir = tempdir().unwrap();
        let mut step = Step::new(
            "logged",
            StepType::Standard,
            "shell",
            ParameterSet::new(),
            ModuleCapabilities::default(),
        );
        step.set_directories(
            temp_dir.path().to_path_buf(),
            temp_dir.path().join("tasks"),
        );

        let context = TaskContext::new(&step, HashMap::new(), HashMap::new());
        let log_path = context.log_path();

        let mut runner = TaskRunner::new(context, Box::new(OkModule));
        runner.run().unwrap();

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Starting task"));
        assert!(content.contains("finished"));
    }

    #[test]
    fn test_quiet_context_disables_logging() {
        assert!(test_context().creates_log());
        assert!(!quiet_context().creates_log());
    }
}
