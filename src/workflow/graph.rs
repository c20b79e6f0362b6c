//! Workflow Aggregate
//!
//! Owns the step arena and everything the steps share: the module
//! registry, the observer and emergency-stop registries, and the event
//! channel the run loop listens on. The graph is built and configured
//! single-threaded, then sealed behind an `Arc` for execution.
//!
//! The run loop is event-driven: every accepted state transition is
//! reported over an mpsc channel, the loop keeps a global step→state
//! table, halts on the first failing step, and turns quiescence (nothing
//! in flight, nothing ready, work remaining) into an error instead of
//! blocking forever.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use sysinfo::System;

use crate::error::EngineError;
use crate::execution::manager::TokenManager;
use crate::execution::token::Token;
use crate::module::{Module, ModuleCapabilities, ModuleError, ModuleRegistry, ParameterSet};

use super::machine::{ObserverRegistry, StepEvent, StepObserver, StepStateMachine};
use super::state::StepState;
use super::step::{ParallelizationMode, PortLink, Step, StepIndex, StepType};
use crate::execution::emergency::EmergencyStopRegistry;
use crate::execution::context::TaskContext;
use crate::execution::result::TaskStatus;

/// String id reserved for the implicit root step.
const ROOT_STEP_ID: &str = "root";

/// Arena index of the implicit root step.
const ROOT_INDEX: StepIndex = StepIndex(0);

/// Default interval after which the run loop checks for quiescence.
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Internal no-op module backing the implicit root step.
struct RootModule;

impl Module for RootModule {
    fn configure(&mut self, _parameters: &ParameterSet) -> Result<(), ModuleError> {
        Ok(())
    }

    fn execute(&self, _context: &TaskContext, _status: &mut TaskStatus) -> Result<(), ModuleError> {
        Ok(())
    }

    fn parallelization_mode(&self) -> ParallelizationMode {
        ParallelizationMode::NotNeeded
    }
}

/// One slot of the step arena.
pub(crate) struct StepRecord {
    pub(crate) step: Step,
    pub(crate) shared_module: Option<Arc<dyn Module>>,
    pub(crate) machine: StepStateMachine,
    pub(crate) manager: TokenManager,
}

/// Shared state of one workflow: the step arena plus the registries and
/// channels every step needs to reach.
pub(crate) struct GraphInner {
    records: Vec<StepRecord>,
    ids: HashMap<String, StepIndex>,
    registry: Arc<ModuleRegistry>,
    observers: Arc<ObserverRegistry>,
    emergency: Arc<EmergencyStopRegistry>,
    events: Mutex<Option<Sender<StepEvent>>>,
    in_flight: AtomicUsize,
}

impl GraphInner {
    pub(crate) fn step(&self, index: StepIndex) -> &Step {
        &self.records[index.0].step
    }

    pub(crate) fn record(&self, index: StepIndex) -> &StepRecord {
        &self.records[index.0]
    }

    pub(crate) fn machine(&self, index: StepIndex) -> &StepStateMachine {
        &self.records[index.0].machine
    }

    pub(crate) fn manager(&self, index: StepIndex) -> &TokenManager {
        &self.records[index.0].manager
    }

    pub(crate) fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub(crate) fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub(crate) fn emergency(&self) -> &EmergencyStopRegistry {
        &self.emergency
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<StepIndex> {
        self.ids.get(&id.trim().to_lowercase()).copied()
    }

    /// Reports a state transition to the run loop, if one is listening.
    pub(crate) fn notify_workflow(&self, event: StepEvent) {
        if let Some(sender) = self.events.lock().unwrap().as_ref() {
            // The loop may already have returned; late events are fine.
            let _ = sender.send(event);
        }
    }

    pub(crate) fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn task_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn tasks_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of output-port links feeding one input port of a step.
    pub(crate) fn incoming_links(&self, step: StepIndex, port: &str) -> usize {
        self.records
            .iter()
            .map(|r| r.step.links_into(step, port))
            .sum()
    }

    /// Emits a token from an output port to every linked input port.
    pub(crate) fn send_token(graph: &Arc<Self>, from: StepIndex, port: &str, token: Token) {
        let step = graph.step(from);
        graph.manager(from).log_sending_token(step.id(), &token);

        for link in step.links(port) {
            graph
                .manager(link.step)
                .post_token(graph, &link.port, token.clone());
        }
    }
}

/// Final states and task counts of a completed run.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    states: HashMap<String, StepState>,
    tasks: HashMap<String, u64>,
    duration: Duration,
}

impl WorkflowReport {
    fn collect(graph: &GraphInner, duration: Duration) -> Self {
        let mut states = HashMap::new();
        let mut tasks = HashMap::new();
        for record in &graph.records {
            states.insert(record.step.id().to_string(), record.machine.current());
            tasks.insert(record.step.id().to_string(), record.manager.tasks_submitted());
        }
        Self {
            states,
            tasks,
            duration,
        }
    }

    /// Final state of a step.
    pub fn state(&self, step_id: &str) -> Option<StepState> {
        self.states.get(step_id).copied()
    }

    /// Number of tasks executed by a step.
    pub fn tasks_executed(&self, step_id: &str) -> u64 {
        self.tasks.get(step_id).copied().unwrap_or(0)
    }

    /// Total number of tasks executed across all steps.
    pub fn total_tasks(&self) -> u64 {
        self.tasks.values().sum()
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// All step ids, sorted.
    pub fn step_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.states.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// A workflow: the step graph, its shared registries, and the run loop.
///
/// Build order: create, add steps and dependencies, `configure()`, link
/// ports, then `execute()`. Configuration binds each step's module,
/// resolves its ports and validates resource hints; linking is only
/// possible once ports are known.
pub struct Workflow {
    graph: Arc<GraphInner>,
    configured: bool,
    output_directory: PathBuf,
    stall_timeout: Duration,
}

impl Workflow {
    /// Creates a workflow using the built-in module registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ModuleRegistry::with_builtins()))
    }

    /// Creates a workflow using a caller-supplied module registry.
    pub fn with_registry(registry: Arc<ModuleRegistry>) -> Self {
        let root_caps = ModuleCapabilities {
            no_log: true,
            reuse_instance: true,
            ..ModuleCapabilities::default()
        };
        let root = Step::new(
            ROOT_STEP_ID,
            StepType::Root,
            ROOT_STEP_ID,
            ParameterSet::new(),
            root_caps,
        );

        let mut ids = HashMap::new();
        ids.insert(ROOT_STEP_ID.to_string(), ROOT_INDEX);

        let graph = GraphInner {
            records: vec![StepRecord {
                step: root,
                shared_module: None,
                machine: StepStateMachine::new(ROOT_INDEX, StepType::Root),
                manager: TokenManager::new(ROOT_INDEX),
            }],
            ids,
            registry,
            observers: Arc::new(ObserverRegistry::new()),
            emergency: Arc::new(EmergencyStopRegistry::new()),
            events: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        };

        Self {
            graph: Arc::new(graph),
            configured: false,
            output_directory: PathBuf::from("stepflow-output"),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    fn inner_mut(&mut self) -> &mut GraphInner {
        Arc::get_mut(&mut self.graph).expect("workflow graph is not shared before execution")
    }

    /// Registers an external observer for step state changes.
    pub fn register_observer(&self, observer: Box<dyn StepObserver>) {
        self.graph.observers().add(observer);
    }

    /// Returns the emergency-stop registry of this run.
    pub fn emergency_registry(&self) -> Arc<EmergencyStopRegistry> {
        Arc::clone(&self.graph.emergency)
    }

    /// Sets the directory receiving per-step output and task directories.
    pub fn set_output_directory(&mut self, directory: impl Into<PathBuf>) {
        self.output_directory = directory.into();
    }

    /// Sets how long the run loop waits without events before checking
    /// for a stalled workflow.
    pub fn set_stall_timeout(&mut self, timeout: Duration) {
        self.stall_timeout = timeout;
    }

    /// Number of steps, including the implicit root step.
    pub fn step_count(&self) -> usize {
        self.graph.records.len()
    }

    /// Looks up a step by its string id.
    pub fn step_index(&self, id: &str) -> Option<StepIndex> {
        self.graph.index_of(id)
    }

    /// Current state of a step.
    pub fn step_state(&self, index: StepIndex) -> StepState {
        self.graph.machine(index).current()
    }

    /// Adds a step whose type is derived from its module's capabilities.
    pub fn add_step(
        &mut self,
        id: &str,
        module: &str,
        parameters: ParameterSet,
    ) -> Result<StepIndex, EngineError> {
        let capabilities = self
            .graph
            .registry
            .capabilities(module)
            .ok_or_else(|| EngineError::UnknownModule(module.trim().to_lowercase()))?;

        let step_type = if capabilities.generator {
            StepType::Generator
        } else if capabilities.terminal {
            StepType::Terminal
        } else {
            StepType::Standard
        };

        self.add_step_with_type(id, step_type, module, parameters)
    }

    /// Adds a step with an explicit type (DESIGN, CHECKER, FIRST, ...).
    pub fn add_step_with_type(
        &mut self,
        id: &str,
        step_type: StepType,
        module: &str,
        parameters: ParameterSet,
    ) -> Result<StepIndex, EngineError> {
        if self.configured {
            return Err(EngineError::AlreadyConfigured);
        }
        if step_type.is_root() {
            return Err(EngineError::RootStepExplicit);
        }

        let id = Step::validate_id(id)?;
        if self.graph.ids.contains_key(&id) {
            return Err(EngineError::DuplicateStepId(id));
        }

        let module_name = module.trim().to_lowercase();
        let capabilities = self
            .graph
            .registry
            .capabilities(&module_name)
            .ok_or_else(|| EngineError::UnknownModule(module_name.clone()))?;

        let index = StepIndex(self.graph.records.len());
        let step = Step::new(&id, step_type, &module_name, parameters, capabilities);

        let inner = self.inner_mut();
        inner.records.push(StepRecord {
            step,
            shared_module: None,
            machine: StepStateMachine::new(index, step_type),
            manager: TokenManager::new(index),
        });
        inner.ids.insert(id, index);

        Ok(index)
    }

    /// Declares that `step` requires `dependency` to be done first.
    ///
    /// Rejects self-dependencies and edges that would close a cycle; the
    /// mirrored dependent set is maintained on the other side.
    pub fn add_dependency(
        &mut self,
        step: StepIndex,
        dependency: StepIndex,
    ) -> Result<(), EngineError> {
        if step == dependency {
            return Err(EngineError::SelfDependency(
                self.graph.step(step).id().to_string(),
            ));
        }
        if self.reaches(dependency, step) {
            return Err(EngineError::CyclicDependency {
                step: self.graph.step(step).id().to_string(),
                dependency: self.graph.step(dependency).id().to_string(),
            });
        }

        self.graph.machine(step).add_required(dependency);
        self.graph.machine(dependency).add_to_inform(step);
        Ok(())
    }

    /// True if `from` transitively requires `target`.
    fn reaches(&self, from: StepIndex, target: StepIndex) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.graph.records.len()];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen[current.0] {
                continue;
            }
            seen[current.0] = true;
            stack.extend(self.graph.machine(current).required());
        }
        false
    }

    /// Links an output port to a downstream input port.
    ///
    /// Validates format equality, compression acceptance and list
    /// compatibility, and implies a dependency of `to` on `from`.
    pub fn link_ports(
        &mut self,
        from: StepIndex,
        output: &str,
        to: StepIndex,
        input: &str,
    ) -> Result<(), EngineError> {
        if !self.configured {
            return Err(EngineError::NotConfigured);
        }

        let from_id = self.graph.step(from).id().to_string();
        let to_id = self.graph.step(to).id().to_string();

        let from_step = self.graph.step(from);
        if from_step.step_type() == StepType::Terminal || from_step.capabilities().terminal {
            return Err(EngineError::TerminalStepLinked(from_id));
        }

        let output_port = from_step
            .output_port(output)
            .ok_or_else(|| EngineError::UnknownPort {
                step: from_id.clone(),
                port: output.to_string(),
            })?
            .clone();
        let input_port = self
            .graph
            .step(to)
            .input_port(input)
            .ok_or_else(|| EngineError::UnknownPort {
                step: to_id.clone(),
                port: input.to_string(),
            })?
            .clone();

        let incompatible = |reason: String| EngineError::IncompatibleLink {
            from: from_id.clone(),
            output: output_port.name().to_string(),
            to: to_id.clone(),
            input: input_port.name().to_string(),
            reason,
        };

        if output_port.format() != input_port.format() {
            return Err(incompatible(format!(
                "format mismatch: {} vs {}",
                output_port.format(),
                input_port.format()
            )));
        }
        if !input_port.accepts_compression(output_port.compression()) {
            return Err(incompatible(format!(
                "compression {} is not accepted",
                output_port.compression()
            )));
        }
        if output_port.is_list() && !input_port.is_list() {
            return Err(incompatible(
                "list output cannot feed a single-element port".to_string(),
            ));
        }

        self.add_dependency(to, from)?;

        let link = PortLink {
            step: to,
            port: input_port.name().to_string(),
        };
        let output_name = output_port.name().to_string();
        self.inner_mut().records[from.0].step.add_link(&output_name, link);

        Ok(())
    }

    /// Sets the skip flag of a generator step.
    pub fn set_skip(&mut self, step: StepIndex, skip: bool) -> Result<(), EngineError> {
        self.inner_mut().records[step.0].step.set_skip(skip)
    }

    /// Sets the processor requirement of a step, validated against the
    /// host at configuration time.
    pub fn set_required_processors(
        &mut self,
        step: StepIndex,
        processors: u32,
    ) -> Result<(), EngineError> {
        if self.configured {
            return Err(EngineError::AlreadyConfigured);
        }
        self.inner_mut().records[step.0]
            .step
            .set_required_processors(processors);
        Ok(())
    }

    /// Sets the memory requirement of a step in megabytes.
    pub fn set_required_memory_mb(
        &mut self,
        step: StepIndex,
        memory_mb: u64,
    ) -> Result<(), EngineError> {
        if self.configured {
            return Err(EngineError::AlreadyConfigured);
        }
        self.inner_mut().records[step.0]
            .step
            .set_required_memory_mb(memory_mb);
        Ok(())
    }

    /// Configures every step: binds its module, resolves ports and
    /// parallelization mode, validates resource hints against the host,
    /// and creates the step directories.
    pub fn configure(&mut self) -> Result<(), EngineError> {
        if self.configured {
            return Err(EngineError::AlreadyConfigured);
        }

        let available_processors = num_cpus::get() as u32;
        let available_memory_mb = host_memory_mb();
        let base = self.output_directory.clone();
        let registry = Arc::clone(&self.graph.registry);

        let count = self.graph.records.len();
        for i in 0..count {
            let (id, module_name, parameters, step_type, processors, memory_mb) = {
                let step = &self.graph.records[i].step;
                (
                    step.id().to_string(),
                    step.module_name().to_string(),
                    step.parameters().clone(),
                    step.step_type(),
                    step.required_processors(),
                    step.required_memory_mb(),
                )
            };

            if processors > 0 && processors > available_processors {
                return Err(EngineError::InsufficientProcessors {
                    step: id,
                    required: processors,
                    available: available_processors,
                });
            }
            if memory_mb > 0 && memory_mb > available_memory_mb {
                return Err(EngineError::InsufficientMemory {
                    step: id,
                    required: memory_mb,
                    available: available_memory_mb,
                });
            }

            let (module, input_ports, output_ports, mode): (
                Arc<dyn Module>,
                Vec<_>,
                Vec<_>,
                ParallelizationMode,
            ) = if step_type.is_root() {
                (
                    Arc::new(RootModule),
                    Vec::new(),
                    Vec::new(),
                    ParallelizationMode::NotNeeded,
                )
            } else {
                let mut module = registry.create(&module_name)?;
                module
                    .configure(&parameters)
                    .map_err(|e| EngineError::ModuleConfiguration {
                        module: module_name.clone(),
                        message: e.to_string(),
                    })?;
                let inputs = module.input_ports();
                let outputs = module.output_ports();
                let mode = module.parallelization_mode();
                (Arc::from(module), inputs, outputs, mode)
            };

            let step_directory = base.join(&id);
            let task_directory = step_directory.join("tasks");
            if !step_type.is_root() {
                fs::create_dir_all(&task_directory)?;
            }

            let record = &mut self.inner_mut().records[i];
            record.step.set_ports(input_ports, output_ports)?;
            record.step.set_parallelization(mode);
            record.step.set_directories(step_directory, task_directory);
            record.shared_module = Some(module);
        }

        // Steps with no declared dependencies hang off the root step so
        // that one completion wave reaches the whole graph.
        for i in 1..count {
            let index = StepIndex(i);
            if self.graph.machine(index).required().is_empty() {
                self.graph.machine(index).add_required(ROOT_INDEX);
                self.graph.machine(ROOT_INDEX).add_to_inform(index);
            }
        }

        for i in 0..count {
            self.graph
                .machine(StepIndex(i))
                .set_state(&self.graph, StepState::Configured);
        }

        self.configured = true;
        Ok(())
    }

    /// Runs the workflow to completion.
    ///
    /// Returns a report once every step is done, or an error naming the
    /// first failing step (or the waiting steps of a stalled graph).
    pub fn execute(self) -> Result<WorkflowReport, EngineError> {
        if !self.configured {
            return Err(EngineError::NotConfigured);
        }

        let started = Instant::now();
        let stall_timeout = self.stall_timeout;
        let graph = self.graph;

        let (sender, receiver) = mpsc::channel();
        *graph.events.lock().unwrap() = Some(sender);

        let count = graph.records.len();
        info!("Starting workflow execution: {} steps", count - 1);

        let mut states: HashMap<StepIndex, StepState> = (0..count)
            .map(|i| (StepIndex(i), graph.machine(StepIndex(i)).current()))
            .collect();

        // Everything waits before the root is released, so no dependent
        // can observe a completed dependency while still CONFIGURED.
        for i in 1..count {
            graph
                .machine(StepIndex(i))
                .set_state(&graph, StepState::Waiting);
        }
        graph
            .machine(ROOT_INDEX)
            .set_state(&graph, StepState::Waiting);

        loop {
            match receiver.recv_timeout(stall_timeout) {
                Ok(event) => {
                    debug!(
                        "Observed step '{}' transition {} -> {}",
                        graph.step(event.index).id(),
                        event.old,
                        event.new
                    );
                    states.insert(event.index, event.new);

                    if event.new == StepState::Fail {
                        let step_id = graph.step(event.index).id().to_string();
                        let manager = graph.manager(event.index);
                        let message = manager
                            .failure_message()
                            .unwrap_or_else(|| "step failed".to_string());

                        error!("Workflow failed at step '{}': {}", step_id, message);
                        if manager.aborted_tasks() > 0 {
                            error!(
                                "Step '{}' aborted {} task(s) before producing output",
                                step_id,
                                manager.aborted_tasks()
                            );
                        }
                        graph.emergency().stop_all();
                        return Err(EngineError::StepFailed {
                            step: step_id,
                            message,
                        });
                    }

                    if states.values().all(|s| s.is_final_state()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if states.values().all(|s| s.is_final_state()) {
                        break;
                    }

                    let active = states
                        .values()
                        .any(|s| *s == StepState::Ready || s.is_working_state());

                    if graph.tasks_in_flight() == 0 && !active {
                        let mut waiting: Vec<String> = states
                            .iter()
                            .filter(|(_, s)| **s == StepState::Waiting)
                            .map(|(i, _)| graph.step(*i).id().to_string())
                            .collect();
                        waiting.sort_unstable();

                        if !waiting.is_empty() {
                            error!("Workflow stalled; waiting steps: {:?}", waiting);
                            for id in &waiting {
                                if let Some(index) = graph.index_of(id) {
                                    let manager = graph.manager(index);
                                    debug!(
                                        "Step '{}': manager started={}, queued data={}",
                                        id,
                                        manager.is_started(),
                                        manager.queued_data()
                                    );
                                }
                            }
                            graph.emergency().stop_all();
                            return Err(EngineError::Stalled(waiting));
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let duration = started.elapsed();
        let report = WorkflowReport::collect(&graph, duration);
        info!(
            "Workflow completed successfully in {:.2?} ({} tasks)",
            duration,
            report.total_tasks()
        );
        Ok(report)
    }

    #[cfg(test)]
    pub(crate) fn graph_handle(&self) -> Arc<GraphInner> {
        Arc::clone(&self.graph)
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

fn host_memory_mb() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024)
}
