//! StepFlow - Step State Machine and Token-Propagation Scheduler
//!
//! An in-process workflow execution engine for multi-step scientific
//! data-processing pipelines. A pipeline is a directed graph of steps
//! connected through typed ports; completed tasks emit tokens along port
//! links, and a step becomes eligible to run only once every one of its
//! dependencies has completed.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`workflow`]: the step graph, per-step state machines and the run loop
//! - [`execution`]: tokens, token managers, task runners and results
//! - [`module`]: the module contract, registry and built-in modules
//! - [`data`]: opaque data handles flowing between steps
//! - [`settings`]: process-global run settings
//!
//! # Example
//!
//! ```rust,no_run
//! use stepflow::module::ParameterSet;
//! use stepflow::workflow::Workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut workflow = Workflow::new();
//!     workflow.set_output_directory("/data/run1");
//!
//!     let fetch = workflow.add_step(
//!         "fetch",
//!         "shell",
//!         ParameterSet::new()
//!             .with("command", "printf 'a\\nb\\n' > {output}")
//!             .with("source", "true"),
//!     )?;
//!     let count = workflow.add_step(
//!         "count",
//!         "shell",
//!         ParameterSet::new().with("command", "wc -l {input} > {output}"),
//!     )?;
//!
//!     workflow.configure()?;
//!     workflow.link_ports(fetch, "output", count, "input")?;
//!
//!     let report = workflow.execute()?;
//!     println!("executed {} tasks", report.total_tasks());
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod execution;
pub mod module;
pub mod settings;
pub mod workflow;

// Re-export commonly used types
pub use data::{CompressionType, Data, DataFile, DataFormat};
pub use error::EngineError;
pub use execution::{TaskContext, TaskResult, TaskRunner, TaskStatus, Token};
pub use module::{Module, ModuleCapabilities, ModuleRegistry, ParameterSet};
pub use settings::Settings;
pub use workflow::{StepState, StepType, Workflow, WorkflowReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepFlow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "StepFlow");
    }

    #[test]
    fn test_module_exports() {
        let params = ParameterSet::new().with("command", "true");
        assert_eq!(params.get("command"), Some("true"));

        let workflow = Workflow::new();
        assert_eq!(workflow.step_count(), 1); // the implicit root step
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
