//! Step State Machine
//!
//! One machine per step owns that step's current state and its direct
//! dependency sets, and gates every requested transition through a single
//! authority method. Readiness is inferred purely from observed dependency
//! states: each completed dependency pokes its dependents, and a dependent
//! moves to READY only once every required step reports done.
//!
//! Locking discipline: the per-step mutex is held only for the
//! read-then-write of the transition itself. No other step's machine is
//! ever touched while a lock is held, so a malformed dependency graph can
//! stall (never become ready) but cannot deadlock.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use super::graph::GraphInner;
use super::state::StepState;
use super::step::{StepIndex, StepType};

/// A state transition reported to the workflow aggregate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepEvent {
    pub index: StepIndex,
    pub old: StepState,
    pub new: StepState,
}

/// External listener for step state changes.
pub trait StepObserver: Send + Sync {
    fn step_state_changed(&self, step_id: &str, old: StepState, new: StepState);
}

/// Typed callback list owned by the workflow.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Box<dyn StepObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Box<dyn StepObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify(&self, step_id: &str, old: StepState, new: StepState) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.step_state_changed(step_id, old, new);
        }
    }
}

struct MachineInner {
    state: StepState,
    /// Direct dependencies (arena indices).
    required: BTreeSet<StepIndex>,
    /// Direct dependents, mirrored from `required` on the other side.
    to_inform: BTreeSet<StepIndex>,
}

/// Per-step state authority.
pub(crate) struct StepStateMachine {
    index: StepIndex,
    step_type: StepType,
    inner: Mutex<MachineInner>,
}

impl StepStateMachine {
    pub(crate) fn new(index: StepIndex, step_type: StepType) -> Self {
        Self {
            index,
            step_type,
            inner: Mutex::new(MachineInner {
                state: StepState::Created,
                required: BTreeSet::new(),
                to_inform: BTreeSet::new(),
            }),
        }
    }

    /// Returns the current state.
    pub(crate) fn current(&self) -> StepState {
        self.inner.lock().unwrap().state
    }

    /// Returns the direct dependencies.
    pub(crate) fn required(&self) -> Vec<StepIndex> {
        self.inner.lock().unwrap().required.iter().copied().collect()
    }

    pub(crate) fn add_required(&self, step: StepIndex) {
        self.inner.lock().unwrap().required.insert(step);
    }

    pub(crate) fn add_to_inform(&self, step: StepIndex) {
        self.inner.lock().unwrap().to_inform.insert(step);
    }

    /// Single authority for state transitions.
    ///
    /// Rejected requests are silent no-ops: duplicate notifications from
    /// concurrent dependents are expected and must be harmless.
    pub(crate) fn set_state(&self, graph: &Arc<GraphInner>, requested: StepState) {
        // A root step has no dependencies to wait for.
        let requested = if self.step_type.is_root() && requested == StepState::Waiting {
            StepState::Ready
        } else {
            requested
        };

        let transition = {
            let mut inner = self.inner.lock().unwrap();

            let rejected = requested == StepState::Created
                || requested == inner.state
                || inner.state.is_final_state()
                || (requested == StepState::Ready && inner.state.is_working_state());

            if rejected {
                None
            } else {
                let old = inner.state;
                inner.state = requested;
                let required: Vec<StepIndex> = inner.required.iter().copied().collect();
                let to_inform: Vec<StepIndex> = inner.to_inform.iter().copied().collect();
                Some((old, required, to_inform))
            }
        };

        let Some((old, required, to_inform)) = transition else {
            return;
        };
        let new = requested;
        let step_id = graph.step(self.index).id();

        info!("Step '{}' state: {} -> {}", step_id, old, new);

        if new == StepState::Waiting {
            let dependencies: Vec<&str> =
                required.iter().map(|i| graph.step(*i).id()).collect();
            debug!("Step '{}' waiting on dependencies: {:?}", step_id, dependencies);
        }

        if new.is_done_state() {
            for dependent in &to_inform {
                graph.machine(*dependent).update_status(graph);
            }
        }

        if new == StepState::Ready {
            graph.manager(self.index).start(graph);
        }

        graph.notify_workflow(StepEvent {
            index: self.index,
            old,
            new,
        });

        graph.observers().notify(step_id, old, new);
    }

    /// Invoked when one of this step's dependencies reaches a done state.
    ///
    /// Moves the step to READY iff every required step reports done. The
    /// dependency states are read without holding this machine's lock;
    /// `set_state` re-checks its gates, so a duplicate READY request from
    /// a racing dependency collapses into a no-op.
    pub(crate) fn update_status(&self, graph: &Arc<GraphInner>) {
        if self.current() == StepState::Ready {
            return;
        }

        let required = self.required();
        let all_done = required
            .iter()
            .all(|r| graph.machine(*r).current().is_done_state());

        if all_done {
            self.set_state(graph, StepState::Ready);
        }
    }
}
