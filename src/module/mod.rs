//! Module Contract
//!
//! The seam between the scheduler and the units of work it runs:
//!
//! - [`Module`]: the trait concrete step implementations provide
//! - [`ModuleCapabilities`]: explicit capability flags attached at
//!   registration time
//! - [`registry`]: name → capabilities + factory
//! - [`parameter`]: ordered, case-normalized parameter sets
//! - [`shell`]: built-in shell command module

pub mod parameter;
pub mod registry;
pub mod shell;

use std::error::Error;

pub use parameter::{Parameter, ParameterSet};
pub use registry::ModuleRegistry;

use crate::execution::context::TaskContext;
use crate::execution::result::TaskStatus;
use crate::workflow::port::{InputPort, OutputPort};
use crate::workflow::step::ParallelizationMode;

/// Error type returned by module implementations.
pub type ModuleError = Box<dyn Error + Send + Sync>;

/// Capability flags for a registered module, resolved at registration
/// time instead of by runtime introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCapabilities {
    /// Produces data without consuming any; its step may be skipped.
    pub generator: bool,
    /// Ends the pipeline; nothing may consume its output.
    pub terminal: bool,
    /// Suppresses per-task log files.
    pub no_log: bool,
    /// The shared, already-configured instance may serve every task;
    /// without this flag a fresh instance is configured per task.
    pub reuse_instance: bool,
}

/// A unit of work the scheduler can run.
///
/// `configure` is called once per instance before any execution; `execute`
/// runs one task and must be safe to call from the task's own thread.
/// Modules that do not opt into instance reuse get a fresh, freshly
/// configured instance for every task of a standard step, so they need not
/// be thread-safe across tasks.
pub trait Module: Send + Sync {
    /// Binds the module to its parameters. Called once per instance.
    fn configure(&mut self, parameters: &ParameterSet) -> Result<(), ModuleError>;

    /// Executes one task against the resolved input/output bindings.
    fn execute(&self, context: &TaskContext, status: &mut TaskStatus) -> Result<(), ModuleError>;

    /// Declares the input port schema. Fixed after configuration.
    fn input_ports(&self) -> Vec<InputPort> {
        Vec::new()
    }

    /// Declares the output port schema. Fixed after configuration.
    fn output_ports(&self) -> Vec<OutputPort> {
        Vec::new()
    }

    /// How many concurrent tasks of this module's step may run.
    fn parallelization_mode(&self) -> ParallelizationMode {
        ParallelizationMode::Standard
    }
}
