//! Token Manager
//!
//! One manager per step bridges "tokens received on input ports" and
//! "tasks dispatched for execution". Tokens arriving before the step is
//! ready queue up; once the manager is started it materializes a task
//! whenever one data element is available across all required input ports,
//! and emits the step's own end-of-step markers once every input port has
//! ended, nothing is pending and no task is in flight.
//!
//! Task granularity follows the step's parallelization mode: one task per
//! data element by default, or a single task over all collected input when
//! the mode is `NotNeeded` (or every input port is a list port). Steps
//! with no input ports dispatch exactly one task at start.
//!
//! A manager never silently drops tokens: data that can no longer be
//! matched once all end markers are in fails the step loudly.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, warn};

use crate::data::{Data, DataFile};
use crate::workflow::graph::GraphInner;
use crate::workflow::state::StepState;
use crate::workflow::step::{ParallelizationMode, Step, StepIndex, StepType};

use super::context::TaskContext;
use super::runner::{ModuleInstance, TaskRunner};
use super::token::Token;

/// What to do once the manager's bookkeeping has been updated.
enum EndAction {
    Nothing,
    /// Emit end-of-step tokens on all output ports and finish the step.
    EmitEnds,
    /// Input tokens can never be consumed; fail the step.
    FailUnconsumed(usize),
}

#[derive(Default)]
struct ManagerInner {
    started: bool,
    end_emitted: bool,
    /// Pending data per non-list input port, in arrival order.
    queues: BTreeMap<String, VecDeque<Data>>,
    /// Aggregated data per list input port.
    collected: BTreeMap<String, Vec<Data>>,
    /// End-of-step markers received per input port.
    ends: BTreeMap<String, usize>,
    tasks_submitted: u64,
    tasks_in_flight: usize,
    aborted_tasks: u64,
    failure: Option<String>,
}

/// Per-step token consumer and task dispatcher.
pub(crate) struct TokenManager {
    index: StepIndex,
    inner: Mutex<ManagerInner>,
}

impl TokenManager {
    pub(crate) fn new(index: StepIndex) -> Self {
        Self {
            index,
            inner: Mutex::new(ManagerInner::default()),
        }
    }

    /// Number of tasks materialized so far.
    pub(crate) fn tasks_submitted(&self) -> u64 {
        self.inner.lock().unwrap().tasks_submitted
    }

    /// Number of tasks recorded as aborted before producing output.
    pub(crate) fn aborted_tasks(&self) -> u64 {
        self.inner.lock().unwrap().aborted_tasks
    }

    /// Number of data elements queued and not yet consumed by a task.
    pub(crate) fn queued_data(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.values().map(VecDeque::len).sum::<usize>()
            + inner.collected.values().map(Vec::len).sum::<usize>()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.inner.lock().unwrap().started
    }

    /// Records the first failure message of the step.
    pub(crate) fn set_failure(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.failure.is_none() {
            inner.failure = Some(message.into());
        }
    }

    pub(crate) fn failure_message(&self) -> Option<String> {
        self.inner.lock().unwrap().failure.clone()
    }

    /// Begins consuming input. Idempotent: the manager starts once, when
    /// its step first reaches READY.
    pub(crate) fn start(&self, graph: &Arc<GraphInner>) {
        let step = graph.step(self.index);

        let (to_dispatch, end_action) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.started {
                return;
            }
            inner.started = true;

            if step.is_skipped() {
                debug!("Step '{}' is skipped; emitting end markers only", step.id());
                inner.end_emitted = true;
                (Vec::new(), EndAction::EmitEnds)
            } else if step.input_ports().is_empty() {
                // Source steps run exactly one task over no input.
                let context = self.materialize_locked(graph, step, &mut inner, HashMap::new());
                (vec![context], EndAction::Nothing)
            } else {
                let contexts = self.pump_locked(graph, step, &mut inner);
                let end_action = self.end_action_locked(graph, step, &mut inner);
                (contexts, end_action)
            }
        };

        self.dispatch_all(graph, to_dispatch);
        self.apply_end_action(graph, end_action);
    }

    /// Registers a token as available on one input port of this step.
    ///
    /// Tokens arriving before `start()` queue up and are consumed once the
    /// step becomes ready.
    pub(crate) fn post_token(&self, graph: &Arc<GraphInner>, port: &str, token: Token) {
        let step = graph.step(self.index);
        let port = port.to_lowercase();

        let Some(input_port) = step.input_port(&port) else {
            warn!(
                "Step '{}' received token #{} on unknown port '{}'",
                step.id(),
                token.id(),
                port
            );
            return;
        };

        debug!(
            "Step '{}' received {} token #{} on port '{}' from step '{}'",
            step.id(),
            if token.is_end_of_step() { "end-of-step" } else { "data" },
            token.id(),
            port,
            graph.step(token.origin_step()).id()
        );

        let is_list = input_port.is_list();

        let (to_dispatch, end_action) = {
            let mut inner = self.inner.lock().unwrap();

            if token.is_end_of_step() {
                *inner.ends.entry(port).or_insert(0) += 1;
            } else if let Some(data) = token.into_data() {
                if is_list {
                    inner.collected.entry(port).or_default().push(data);
                } else {
                    inner.queues.entry(port).or_default().push_back(data);
                }
            }

            if !inner.started || inner.failure.is_some() || inner.end_emitted {
                (Vec::new(), EndAction::Nothing)
            } else {
                let contexts = self.pump_locked(graph, step, &mut inner);
                let end_action = self.end_action_locked(graph, step, &mut inner);
                (contexts, end_action)
            }
        };

        self.dispatch_all(graph, to_dispatch);
        self.apply_end_action(graph, end_action);
    }

    /// Records a task that was aborted before producing output, so the
    /// step can still reach a terminal state instead of waiting for
    /// tokens that will never arrive.
    pub(crate) fn add_failed_output_data(&self, graph: &Arc<GraphInner>, context: &TaskContext) {
        let step = graph.step(self.index);
        let mut inner = self.inner.lock().unwrap();
        inner.aborted_tasks += 1;
        warn!(
            "Step '{}': task {} ({}) aborted before producing output",
            step.id(),
            context.id(),
            context.context_name()
        );
    }

    /// Diagnostic hook invoked whenever the step emits a token.
    pub(crate) fn log_sending_token(&self, step_id: &str, token: &Token) {
        debug!(
            "Step '{}' sending {} token #{} on port '{}'",
            step_id,
            if token.is_end_of_step() { "end-of-step" } else { "data" },
            token.id(),
            token.origin_port()
        );
    }

    /// Called by the dispatcher when one task has fully finished
    /// (tokens sent or failure recorded).
    pub(crate) fn task_finished(&self, graph: &Arc<GraphInner>, failed: bool) {
        let step = graph.step(self.index);

        let end_action = {
            let mut inner = self.inner.lock().unwrap();
            inner.tasks_in_flight = inner.tasks_in_flight.saturating_sub(1);

            if failed || inner.failure.is_some() {
                EndAction::Nothing
            } else {
                self.end_action_locked(graph, step, &mut inner)
            }
        };

        self.apply_end_action(graph, end_action);

        // The global counter is released last so the run loop never
        // observes a quiescent workflow while transitions are pending.
        graph.task_done();
    }

    /// Materializes every task that can run with the data at hand.
    fn pump_locked(
        &self,
        graph: &Arc<GraphInner>,
        step: &Step,
        inner: &mut ManagerInner,
    ) -> Vec<TaskContext> {
        if step.input_ports().is_empty() {
            return Vec::new();
        }

        let list_ports: Vec<String> = step
            .input_ports()
            .iter()
            .filter(|p| p.is_list())
            .map(|p| p.name().to_string())
            .collect();
        let element_ports: Vec<String> = step
            .input_ports()
            .iter()
            .filter(|p| !p.is_list())
            .map(|p| p.name().to_string())
            .collect();

        let single_shot = step.parallelization() == ParallelizationMode::NotNeeded
            || element_ports.is_empty();

        let mut contexts = Vec::new();

        if single_shot {
            if inner.tasks_submitted == 0 && self.all_ports_ended(graph, step, inner) {
                let mut inputs: HashMap<String, Vec<Data>> = HashMap::new();
                for port in &element_ports {
                    let drained: Vec<Data> = inner
                        .queues
                        .get_mut(port)
                        .map(|q| q.drain(..).collect())
                        .unwrap_or_default();
                    inputs.insert(port.clone(), drained);
                }
                for port in &list_ports {
                    inputs.insert(
                        port.clone(),
                        inner.collected.remove(port).unwrap_or_default(),
                    );
                }
                contexts.push(self.materialize_locked(graph, step, inner, inputs));
            }
            return contexts;
        }

        // One task per pairing of queued elements; list ports contribute
        // their full collection to every task once they have ended.
        loop {
            let lists_ready = list_ports
                .iter()
                .all(|p| self.port_ended(graph, inner, p));
            if !lists_ready {
                break;
            }

            let elements_ready = element_ports
                .iter()
                .all(|p| inner.queues.get(p).is_some_and(|q| !q.is_empty()));
            if !elements_ready {
                break;
            }

            let mut inputs: HashMap<String, Vec<Data>> = HashMap::new();
            for port in &element_ports {
                let data = inner
                    .queues
                    .get_mut(port)
                    .and_then(VecDeque::pop_front)
                    .expect("queue emptiness was checked above");
                inputs.insert(port.clone(), vec![data]);
            }
            for port in &list_ports {
                inputs.insert(
                    port.clone(),
                    inner.collected.get(port).cloned().unwrap_or_default(),
                );
            }
            contexts.push(self.materialize_locked(graph, step, inner, inputs));
        }

        contexts
    }

    /// Builds the task context for one set of inputs and reserves its
    /// in-flight slot.
    fn materialize_locked(
        &self,
        graph: &Arc<GraphInner>,
        step: &Step,
        inner: &mut ManagerInner,
        inputs: HashMap<String, Vec<Data>>,
    ) -> TaskContext {
        inner.tasks_submitted += 1;
        inner.tasks_in_flight += 1;
        graph.task_started();

        let outputs = resolve_outputs(step, &inputs, inner.tasks_submitted);
        TaskContext::new(step, inputs, outputs)
    }

    /// True when `port` has received as many end markers as it has
    /// incoming links. A port with no incoming links can never end.
    fn port_ended(&self, graph: &Arc<GraphInner>, inner: &ManagerInner, port: &str) -> bool {
        let expected = graph.incoming_links(self.index, port);
        expected > 0 && inner.ends.get(port).copied().unwrap_or(0) >= expected
    }

    fn all_ports_ended(&self, graph: &Arc<GraphInner>, step: &Step, inner: &ManagerInner) -> bool {
        step.input_ports()
            .iter()
            .all(|p| self.port_ended(graph, inner, p.name()))
    }

    /// Decides whether the step can finish. Must run with the lock held,
    /// after `pump_locked`.
    fn end_action_locked(
        &self,
        graph: &Arc<GraphInner>,
        step: &Step,
        inner: &mut ManagerInner,
    ) -> EndAction {
        if inner.end_emitted || inner.failure.is_some() || inner.tasks_in_flight > 0 {
            return EndAction::Nothing;
        }

        if step.input_ports().is_empty() {
            if inner.tasks_submitted >= 1 {
                inner.end_emitted = true;
                return EndAction::EmitEnds;
            }
            return EndAction::Nothing;
        }

        if !self.all_ports_ended(graph, step, inner) {
            return EndAction::Nothing;
        }

        let leftover: usize = inner.queues.values().map(VecDeque::len).sum();
        let undelivered: usize = if inner.tasks_submitted == 0 {
            inner.collected.values().map(Vec::len).sum()
        } else {
            0
        };

        if leftover + undelivered > 0 {
            return EndAction::FailUnconsumed(leftover + undelivered);
        }

        inner.end_emitted = true;
        EndAction::EmitEnds
    }

    fn dispatch_all(&self, graph: &Arc<GraphInner>, contexts: Vec<TaskContext>) {
        if contexts.is_empty() {
            return;
        }

        let machine = graph.machine(self.index);
        if machine.current() == StepState::Ready {
            machine.set_state(graph, StepState::Working);
        }

        for context in contexts {
            dispatch_task(graph, self.index, context);
        }
    }

    fn apply_end_action(&self, graph: &Arc<GraphInner>, action: EndAction) {
        match action {
            EndAction::Nothing => {}
            EndAction::EmitEnds => {
                let step = graph.step(self.index);
                for port in step.output_ports() {
                    GraphInner::send_token(
                        graph,
                        self.index,
                        port.name(),
                        Token::end_of_step_token(self.index, port.name()),
                    );
                }
                graph.machine(self.index).set_state(graph, StepState::Done);
            }
            EndAction::FailUnconsumed(count) => {
                self.set_failure(format!(
                    "{} input tokens left unconsumed at end of step",
                    count
                ));
                graph.machine(self.index).set_state(graph, StepState::Fail);
            }
        }
    }
}

/// Names each output element after the task's input data, falling back to
/// a step-derived name, and points it at a file under the step's output
/// directory.
fn resolve_outputs(
    step: &Step,
    inputs: &HashMap<String, Vec<Data>>,
    task_seq: u64,
) -> HashMap<String, Data> {
    let mut sorted_inputs: Vec<(&String, &Vec<Data>)> = inputs.iter().collect();
    sorted_inputs.sort_by(|a, b| a.0.cmp(b.0));

    let base_name = sorted_inputs
        .iter()
        .flat_map(|(_, elements)| elements.iter())
        .map(Data::name)
        .find(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_{}", step.id(), task_seq));

    let mut outputs = HashMap::new();
    for port in step.output_ports() {
        let file_name = format!(
            "{}_{}{}{}",
            base_name,
            port.name(),
            port.format().extension(),
            port.compression().extension()
        );
        let data = Data::new(base_name.clone(), port.format().clone())
            .with_file(DataFile::new(step.output_directory().join(file_name)));
        outputs.insert(port.name().to_string(), data);
    }
    outputs
}

/// Spawns the managing thread of one task. The thread creates the module
/// instance, runs the task to completion, then reports back to the
/// manager.
fn dispatch_task(graph: &Arc<GraphInner>, index: StepIndex, context: TaskContext) {
    let task_id = context.id();
    let thread_graph = Arc::clone(graph);

    let spawned = thread::Builder::new()
        .name(format!("dispatch-task-{}", task_id))
        .spawn(move || run_dispatched_task(thread_graph, index, context));

    if let Err(e) = spawned {
        error!("Failed to spawn dispatcher for task {}: {}", task_id, e);
        let manager = graph.manager(index);
        manager.set_failure(format!("failed to spawn task thread: {}", e));
        graph.machine(index).set_state(graph, StepState::Fail);
        manager.task_finished(graph, true);
    }
}

fn run_dispatched_task(graph: Arc<GraphInner>, index: StepIndex, context: TaskContext) {
    let record = graph.record(index);
    let step = &record.step;
    let task_id = context.id();

    // Standard steps get a fresh, freshly configured instance per task
    // unless the module opts into instance reuse; everything else invokes
    // the shared instance directly.
    let fresh = step.step_type() == StepType::Standard && !step.capabilities().reuse_instance;
    let instance: Result<ModuleInstance, String> = if fresh {
        graph
            .registry()
            .create(step.module_name())
            .map_err(|e| e.to_string())
            .and_then(|mut module| {
                module
                    .configure(step.parameters())
                    .map_err(|e| format!("module configuration failed: {}", e))?;
                Ok(ModuleInstance::Fresh(module))
            })
    } else {
        record
            .shared_module
            .clone()
            .map(ModuleInstance::Shared)
            .ok_or_else(|| format!("step '{}' has no configured module instance", step.id()))
    };

    let manager = graph.manager(index);

    let instance = match instance {
        Ok(instance) => instance,
        Err(message) => {
            error!("Task {} of step '{}' failed: {}", task_id, step.id(), message);
            manager.add_failed_output_data(&graph, &context);
            manager.set_failure(message);
            graph.machine(index).set_state(&graph, StepState::Fail);
            manager.task_finished(&graph, true);
            return;
        }
    };

    let mut runner = TaskRunner::from_instance(context, instance);
    let outcome = runner
        .run()
        .map(|result| (result.is_success(), result.error_message().map(String::from)));

    match outcome {
        Ok((true, _)) => {
            if let Err(e) = runner.send_tokens(&graph, index) {
                error!("Failed to send tokens for task {}: {}", task_id, e);
            }
            manager.task_finished(&graph, false);
        }
        Ok((false, message)) => {
            let message = message.unwrap_or_else(|| "task failed".to_string());
            error!("Task {} of step '{}' failed: {}", task_id, step.id(), message);
            manager.set_failure(message);
            graph.machine(index).set_state(&graph, StepState::Fail);
            manager.task_finished(&graph, true);
        }
        Err(e) => {
            // The runner could not execute at all; account for the task so
            // the step still terminates.
            error!("Task {} of step '{}' could not run: {}", task_id, step.id(), e);
            manager.add_failed_output_data(&graph, runner.context());
            manager.set_failure(e.to_string());
            graph.machine(index).set_state(&graph, StepState::Fail);
            manager.task_finished(&graph, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::tests::{wait_for_state, TestWorkflowBuilder};

    #[test]
    fn test_start_is_idempotent() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .build();
        let graph = workflow.graph_handle();
        let index = graph.index_of("gen").unwrap();

        graph.machine(index).set_state(&graph, StepState::Ready);
        graph.manager(index).start(&graph);
        graph.manager(index).start(&graph);

        assert_eq!(graph.manager(index).tasks_submitted(), 1);
        wait_for_state(&graph, index, StepState::Done);
    }

    #[test]
    fn test_tokens_queue_before_start() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .step("proc", "mock-process")
            .link("gen", "proc")
            .build();
        let graph = workflow.graph_handle();
        let gen = graph.index_of("gen").unwrap();
        let proc = graph.index_of("proc").unwrap();

        let data = Data::new("early", crate::data::DataFormat::text());
        graph
            .manager(proc)
            .post_token(&graph, "input", Token::data_token(gen, "output", data));

        assert!(!graph.manager(proc).is_started());
        assert_eq!(graph.manager(proc).tasks_submitted(), 0);
        assert_eq!(graph.manager(proc).queued_data(), 1);

        graph.machine(proc).set_state(&graph, StepState::Ready);
        wait_for_state(&graph, proc, StepState::PartiallyDone);

        assert_eq!(graph.manager(proc).tasks_submitted(), 1);
        assert_eq!(graph.manager(proc).queued_data(), 0);
    }

    #[test]
    fn test_end_markers_finish_the_step() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .step("proc", "mock-process")
            .link("gen", "proc")
            .build();
        let graph = workflow.graph_handle();
        let gen = graph.index_of("gen").unwrap();
        let proc = graph.index_of("proc").unwrap();

        graph.machine(proc).set_state(&graph, StepState::Ready);

        let data = Data::new("sample", crate::data::DataFormat::text());
        graph
            .manager(proc)
            .post_token(&graph, "input", Token::data_token(gen, "output", data));
        wait_for_state(&graph, proc, StepState::PartiallyDone);

        graph
            .manager(proc)
            .post_token(&graph, "input", Token::end_of_step_token(gen, "output"));
        wait_for_state(&graph, proc, StepState::Done);

        assert_eq!(graph.manager(proc).tasks_submitted(), 1);
    }

    #[test]
    fn test_unknown_port_is_reported_not_queued() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .step("proc", "mock-process")
            .link("gen", "proc")
            .build();
        let graph = workflow.graph_handle();
        let gen = graph.index_of("gen").unwrap();
        let proc = graph.index_of("proc").unwrap();

        let data = Data::new("stray", crate::data::DataFormat::text());
        graph
            .manager(proc)
            .post_token(&graph, "nonexistent", Token::data_token(gen, "output", data));

        assert_eq!(graph.manager(proc).queued_data(), 0);
    }

    #[test]
    fn test_unconsumed_tokens_fail_the_step() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("left", "mock-generator")
            .step("right", "mock-generator")
            .step("pair", "mock-pair")
            .link_port("left", "pair", "first")
            .link_port("right", "pair", "second")
            .build();
        let graph = workflow.graph_handle();
        let left = graph.index_of("left").unwrap();
        let right = graph.index_of("right").unwrap();
        let pair = graph.index_of("pair").unwrap();

        graph.machine(pair).set_state(&graph, StepState::Ready);

        let manager = graph.manager(pair);
        let format = crate::data::DataFormat::text();
        manager.post_token(
            &graph,
            "first",
            Token::data_token(left, "output", Data::new("a1", format.clone())),
        );
        manager.post_token(
            &graph,
            "first",
            Token::data_token(left, "output", Data::new("a2", format.clone())),
        );
        manager.post_token(
            &graph,
            "second",
            Token::data_token(right, "output", Data::new("b1", format)),
        );
        manager.post_token(&graph, "first", Token::end_of_step_token(left, "output"));
        manager.post_token(&graph, "second", Token::end_of_step_token(right, "output"));

        wait_for_state(&graph, pair, StepState::Fail);

        let message = manager.failure_message().unwrap();
        assert!(message.contains("unconsumed"));
        assert_eq!(manager.tasks_submitted(), 1);
    }

    #[test]
    fn test_aborted_task_accounting() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .build();
        let graph = workflow.graph_handle();
        let index = graph.index_of("gen").unwrap();

        let context = TaskContext::new(
            &graph.record(index).step,
            HashMap::new(),
            HashMap::new(),
        );
        graph.manager(index).add_failed_output_data(&graph, &context);

        assert_eq!(graph.manager(index).aborted_tasks(), 1);
    }

    #[test]
    fn test_skipped_generator_emits_only_ends() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .skipped_step("gen", "mock-generator")
            .step("proc", "mock-process")
            .link("gen", "proc")
            .build();
        let graph = workflow.graph_handle();
        let gen = graph.index_of("gen").unwrap();
        let proc = graph.index_of("proc").unwrap();

        graph.machine(gen).set_state(&graph, StepState::Ready);
        wait_for_state(&graph, gen, StepState::Done);
        assert_eq!(graph.manager(gen).tasks_submitted(), 0);

        // Downstream sees only the end marker and completes with no tasks.
        graph.machine(proc).set_state(&graph, StepState::Ready);
        wait_for_state(&graph, proc, StepState::Done);
        assert_eq!(graph.manager(proc).tasks_submitted(), 0);
    }

    #[test]
    fn test_single_shot_mode_runs_one_task_over_all_input() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .step("merge", "mock-merge")
            .link("gen", "merge")
            .build();
        let graph = workflow.graph_handle();
        let gen = graph.index_of("gen").unwrap();
        let merge = graph.index_of("merge").unwrap();

        graph.machine(merge).set_state(&graph, StepState::Ready);

        let manager = graph.manager(merge);
        let format = crate::data::DataFormat::text();
        for name in ["s1", "s2", "s3"] {
            manager.post_token(
                &graph,
                "input",
                Token::data_token(gen, "output", Data::new(name, format.clone())),
            );
        }
        assert_eq!(manager.tasks_submitted(), 0);

        manager.post_token(&graph, "input", Token::end_of_step_token(gen, "output"));
        wait_for_state(&graph, merge, StepState::Done);

        assert_eq!(manager.tasks_submitted(), 1);
    }

    #[test]
    fn test_resolve_outputs_names_follow_input() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("proc", "mock-process")
            .build();
        let graph = workflow.graph_handle();
        let index = graph.index_of("proc").unwrap();
        let step = &graph.record(index).step;

        let mut inputs = HashMap::new();
        inputs.insert(
            "input".to_string(),
            vec![Data::new("sample7", crate::data::DataFormat::text())],
        );

        let outputs = resolve_outputs(step, &inputs, 1);
        let output = outputs.get("output").unwrap();

        assert_eq!(output.name(), "sample7");
        let file = output.first_file().unwrap();
        assert!(file.path().starts_with(step.output_directory()));
        assert!(file.name().unwrap().starts_with("sample7_output"));
    }

    #[test]
    fn test_resolve_outputs_generic_name_without_input() {
        let (workflow, _dir) = TestWorkflowBuilder::new()
            .step("gen", "mock-generator")
            .build();
        let graph = workflow.graph_handle();
        let index = graph.index_of("gen").unwrap();
        let step = &graph.record(index).step;

        let outputs = resolve_outputs(step, &HashMap::new(), 3);
        assert_eq!(outputs.get("output").unwrap().name(), "gen_3");
    }
}
