//! Workflow Graph Module
//!
//! The step graph and its execution state:
//!
//! - [`step`]: step records, types and parallelization modes
//! - [`port`]: typed input/output ports and name validation
//! - [`state`]: the step lifecycle states
//! - [`machine`]: the per-step state machine and dependency tracking
//! - [`graph`]: the workflow aggregate and run loop

pub mod graph;
pub mod machine;
pub mod port;
pub mod state;
pub mod step;

pub use graph::{Workflow, WorkflowReport};
pub use machine::{ObserverRegistry, StepObserver};
pub use port::{InputPort, OutputPort};
pub use state::StepState;
pub use step::{ParallelizationMode, Step, StepIndex, StepType};
