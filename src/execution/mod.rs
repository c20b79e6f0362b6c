//! Task Execution Module
//!
//! Everything that turns tokens into executed tasks:
//!
//! - [`token`]: immutable data / end-of-step messages
//! - [`manager`]: per-step token consumption and task dispatch
//! - [`context`]: serializable per-task descriptions
//! - [`runner`]: one-task execution with full failure containment
//! - [`result`]: immutable task results and the mutable task status
//! - [`logger`]: per-task log files
//! - [`emergency`]: the emergency-stop registry

pub mod context;
pub mod emergency;
pub mod logger;
pub(crate) mod manager;
pub mod result;
pub mod runner;
pub mod token;

pub use context::{TaskContext, LOG_FILE_EXTENSION};
pub use emergency::{EmergencyStopRegistry, EmergencyStopTask};
pub use logger::TaskLogger;
pub use result::{TaskResult, TaskStatus};
pub use runner::TaskRunner;
pub use token::Token;
