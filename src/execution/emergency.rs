//! Emergency Stop
//!
//! A registry of pluggable stop tasks invoked in one pass when the process
//! is asked to halt. Stopping only prevents new work from being issued; it
//! never forcibly cancels running task threads. The registry is owned by
//! the workflow and dies with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{info, warn};

/// A unit of cleanup work run when execution is halted.
pub trait EmergencyStopTask: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Performs the stop action. Must not block for long.
    fn stop(&self);
}

/// Registry of emergency stop tasks for one workflow run.
#[derive(Default)]
pub struct EmergencyStopRegistry {
    tasks: Mutex<Vec<Box<dyn EmergencyStopTask>>>,
    fired: AtomicBool,
}

impl EmergencyStopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stop task.
    pub fn add(&self, task: Box<dyn EmergencyStopTask>) {
        self.tasks.lock().unwrap().push(task);
    }

    /// Returns the number of registered stop tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every registered stop task in one pass. Only the first
    /// call has an effect; later calls return zero.
    pub fn stop_all(&self) -> usize {
        if self.fired.swap(true, Ordering::SeqCst) {
            warn!("Emergency stop already performed");
            return 0;
        }

        let tasks = self.tasks.lock().unwrap();
        for task in tasks.iter() {
            info!("Emergency stop: running '{}'", task.name());
            task.stop();
        }
        tasks.len()
    }

    /// Returns true once [`stop_all`](Self::stop_all) has run.
    pub fn is_stopped(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
