//! Step Lifecycle States
//!
//! The state of a step during workflow execution. The typical path is
//! CREATED → CONFIGURED → WAITING → READY → WORKING → PARTIALLY_DONE →
//! DONE; FAIL is an absorbing state reachable from the working states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepState {
    /// Step object exists but has not been configured.
    Created,
    /// Module bound, ports resolved, parameters checked.
    Configured,
    /// Waiting for dependencies to complete.
    Waiting,
    /// All dependencies completed; token manager may run.
    Ready,
    /// At least one task has been dispatched.
    Working,
    /// Producing output incrementally, not finished yet.
    PartiallyDone,
    /// All tasks finished and end-of-step markers emitted.
    Done,
    /// A task failed; no further transitions are accepted.
    Fail,
}

impl StepState {
    /// Returns true for states in which tasks are running or have run
    /// without the step being finished (WORKING, PARTIALLY_DONE).
    pub fn is_working_state(self) -> bool {
        matches!(self, Self::Working | Self::PartiallyDone)
    }

    /// Returns true if the step has completed and dependents may become
    /// ready. Only DONE qualifies: PARTIALLY_DONE is a working sub-state,
    /// and a FAILED dependency must keep dependents waiting.
    pub fn is_done_state(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true for absorbing states: once reached, no further
    /// transition is accepted.
    pub fn is_final_state(self) -> bool {
        matches!(self, Self::Done | Self::Fail)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Working => "working",
            Self::PartiallyDone => "partially done",
            Self::Done => "done",
            Self::Fail => "failed",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_states() {
        assert!(StepState::Working.is_working_state());
        assert!(StepState::PartiallyDone.is_working_state());
        assert!(!StepState::Ready.is_working_state());
        assert!(!StepState::Done.is_working_state());
    }

    #[test]
    fn test_done_state_is_only_done() {
        assert!(StepState::Done.is_done_state());
        assert!(!StepState::PartiallyDone.is_done_state());
        assert!(!StepState::Fail.is_done_state());
        assert!(!StepState::Working.is_done_state());
    }

    #[test]
    fn test_final_states() {
        assert!(StepState::Done.is_final_state());
        assert!(StepState::Fail.is_final_state());
        assert!(!StepState::PartiallyDone.is_final_state());
        assert!(!StepState::Waiting.is_final_state());
    }

    #[test]
    fn test_display() {
        assert_eq!(StepState::PartiallyDone.to_string(), "partially done");
        assert_eq!(StepState::Fail.to_string(), "failed");
    }
}
