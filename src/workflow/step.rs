//! Workflow Steps
//!
//! A step is one node of the workflow graph: a module bound to parameters,
//! ports, an execution mode and resource hints. Steps are created by the
//! workflow during graph construction, configured exactly once, and keep
//! their numeric id for the lifetime of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::module::{ModuleCapabilities, ParameterSet};

use super::port::{InputPort, OutputPort};

/// Process-wide step counter; numbers are assigned once and never reused.
static NEXT_STEP_NUMBER: AtomicU64 = AtomicU64::new(0);

/// Index of a step in its workflow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepIndex(pub(crate) usize);

/// Role of a step in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Synthetic entry point; has no dependencies and becomes ready
    /// immediately.
    Root,
    /// Reads the experiment design.
    Design,
    /// Validates inputs before the pipeline proper.
    Checker,
    /// First user step of the pipeline.
    First,
    /// Produces data without consuming any.
    Generator,
    /// Ordinary processing step.
    Standard,
    /// Ends the pipeline; nothing may consume its output.
    Terminal,
}

impl StepType {
    pub fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }
}

/// How many concurrent tasks of one step may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParallelizationMode {
    /// The whole step runs as a single task over all of its input.
    NotNeeded,
    /// One task per input data element; tasks may run concurrently.
    #[default]
    Standard,
    /// The module manages its own internal parallelism; the scheduler
    /// still dispatches one task per data element.
    OwnParallelization,
}

/// A link from an output port to one downstream input port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortLink {
    pub(crate) step: StepIndex,
    pub(crate) port: String,
}

/// One node of the workflow graph.
#[derive(Debug)]
pub struct Step {
    number: u64,
    id: String,
    step_type: StepType,
    module_name: String,
    parameters: ParameterSet,
    capabilities: ModuleCapabilities,
    parallelization: ParallelizationMode,
    required_memory_mb: u64,
    required_processors: u32,
    skip: bool,
    create_log: bool,
    output_directory: PathBuf,
    task_directory: PathBuf,
    input_ports: Vec<InputPort>,
    output_ports: Vec<OutputPort>,
    output_links: HashMap<String, Vec<PortLink>>,
}

impl Step {
    /// Creates a step. Numeric ids come from a process-wide counter and
    /// are never reused.
    pub(crate) fn new(
        id: impl Into<String>,
        step_type: StepType,
        module_name: impl Into<String>,
        parameters: ParameterSet,
        capabilities: ModuleCapabilities,
    ) -> Self {
        Self {
            number: NEXT_STEP_NUMBER.fetch_add(1, Ordering::SeqCst) + 1,
            id: id.into(),
            step_type,
            module_name: module_name.into(),
            parameters,
            capabilities,
            parallelization: ParallelizationMode::default(),
            required_memory_mb: 0,
            required_processors: 0,
            skip: false,
            create_log: !capabilities.no_log,
            output_directory: PathBuf::new(),
            task_directory: PathBuf::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            output_links: HashMap::new(),
        }
    }

    /// Validates a step id and returns its normalized (lowercase) form.
    pub(crate) fn validate_id(id: &str) -> Result<String, EngineError> {
        let normalized = id.trim().to_lowercase();

        let mut chars = normalized.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
            }
            _ => false,
        };

        if valid {
            Ok(normalized)
        } else {
            Err(EngineError::InvalidStepId(id.to_string()))
        }
    }

    /// Process-wide unique numeric id.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Workflow-unique string id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step_type(&self) -> StepType {
        self.step_type
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn capabilities(&self) -> ModuleCapabilities {
        self.capabilities
    }

    pub fn parallelization(&self) -> ParallelizationMode {
        self.parallelization
    }

    pub fn required_memory_mb(&self) -> u64 {
        self.required_memory_mb
    }

    pub fn required_processors(&self) -> u32 {
        self.required_processors
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn creates_log(&self) -> bool {
        self.create_log
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Directory receiving per-task artifacts (log files).
    pub fn task_directory(&self) -> &Path {
        &self.task_directory
    }

    pub fn input_ports(&self) -> &[InputPort] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[OutputPort] {
        &self.output_ports
    }

    /// Looks up an input port by (case-insensitive) name.
    pub fn input_port(&self, name: &str) -> Option<&InputPort> {
        let name = name.to_lowercase();
        self.input_ports.iter().find(|p| p.name() == name)
    }

    /// Looks up an output port by (case-insensitive) name.
    pub fn output_port(&self, name: &str) -> Option<&OutputPort> {
        let name = name.to_lowercase();
        self.output_ports.iter().find(|p| p.name() == name)
    }

    /// Returns the links registered on an output port.
    pub(crate) fn links(&self, port: &str) -> &[PortLink] {
        self.output_links.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Counts this step's links into one input port of another step.
    pub(crate) fn links_into(&self, target: StepIndex, port: &str) -> usize {
        self.output_links
            .values()
            .flatten()
            .filter(|l| l.step == target && l.port == port)
            .count()
    }

    pub(crate) fn set_ports(
        &mut self,
        input_ports: Vec<InputPort>,
        output_ports: Vec<OutputPort>,
    ) -> Result<(), EngineError> {
        for (i, port) in input_ports.iter().enumerate() {
            if input_ports[..i].iter().any(|p| p.name() == port.name()) {
                return Err(EngineError::DuplicatePort {
                    step: self.id.clone(),
                    port: port.name().to_string(),
                });
            }
        }
        for (i, port) in output_ports.iter().enumerate() {
            if output_ports[..i].iter().any(|p| p.name() == port.name()) {
                return Err(EngineError::DuplicatePort {
                    step: self.id.clone(),
                    port: port.name().to_string(),
                });
            }
        }

        self.input_ports = input_ports;
        self.output_ports = output_ports;
        Ok(())
    }

    pub(crate) fn set_parallelization(&mut self, mode: ParallelizationMode) {
        self.parallelization = mode;
    }

    pub(crate) fn set_directories(&mut self, output: PathBuf, task: PathBuf) {
        self.output_directory = output;
        self.task_directory = task;
    }

    pub(crate) fn set_required_memory_mb(&mut self, mb: u64) {
        self.required_memory_mb = mb;
    }

    pub(crate) fn set_required_processors(&mut self, processors: u32) {
        self.required_processors = processors;
    }

    /// Sets the skip flag; only generator steps may be skipped.
    pub(crate) fn set_skip(&mut self, skip: bool) -> Result<(), EngineError> {
        if self.step_type != StepType::Generator {
            return Err(EngineError::SkipNotAllowed(self.id.clone()));
        }
        self.skip = skip;
        Ok(())
    }

    pub(crate) fn add_link(&mut self, port: &str, link: PortLink) {
        self.output_links.entry(port.to_string()).or_default().push(link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_step(id: &str, step_type: StepType) -> Step {
        Step::new(
            id,
            step_type,
            "shell",
            ParameterSet::new(),
            ModuleCapabilities::default(),
        )
    }

    #[test]
    fn test_step_numbers_are_unique_and_increasing() {
        let a = test_step("a", StepType::Standard);
        let b = test_step("b", StepType::Standard);

        assert_ne!(a.number(), b.number());
        assert!(b.number() > a.number());
    }

    #[test]
    fn test_step_id_validation() {
        assert_eq!(Step::validate_id("mapping").unwrap(), "mapping");
        assert_eq!(Step::validate_id("  Mapping-2 ").unwrap(), "mapping-2");

        assert!(Step::validate_id("").is_err());
        assert!(Step::validate_id("2fast").is_err());
        assert!(Step::validate_id("my step").is_err());
    }

    #[test]
    fn test_skip_only_on_generators() {
        let mut generator = test_step("gen", StepType::Generator);
        assert!(generator.set_skip(true).is_ok());
        assert!(generator.is_skipped());

        let mut standard = test_step("std", StepType::Standard);
        assert!(matches!(
            standard.set_skip(true),
            Err(EngineError::SkipNotAllowed(_))
        ));
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        use crate::data::DataFormat;
        use crate::workflow::port::InputPort;

        let mut step = test_step("dup", StepType::Standard);
        let ports = vec![
            InputPort::new("input", DataFormat::text()).unwrap(),
            InputPort::new("INPUT", DataFormat::text()).unwrap(),
        ];

        let result = step.set_ports(ports, Vec::new());
        assert!(matches!(result, Err(EngineError::DuplicatePort { .. })));
    }

    #[test]
    fn test_port_lookup_is_case_insensitive() {
        use crate::data::DataFormat;
        use crate::workflow::port::{InputPort, OutputPort};

        let mut step = test_step("lookup", StepType::Standard);
        step.set_ports(
            vec![InputPort::new("input", DataFormat::text()).unwrap()],
            vec![OutputPort::new("output", DataFormat::text()).unwrap()],
        )
        .unwrap();

        assert!(step.input_port("INPUT").is_some());
        assert!(step.output_port("Output").is_some());
        assert!(step.input_port("missing").is_none());
    }

    #[test]
    fn test_no_log_capability_disables_step_log() {
        let caps = ModuleCapabilities {
            no_log: true,
            ..ModuleCapabilities::default()
        };
        let step = Step::new("quiet", StepType::Standard, "shell", ParameterSet::new(), caps);

        assert!(!step.creates_log());
    }

    #[test]
    fn test_links_multiset() {
        let mut step = test_step("fanout", StepType::Standard);
        step.add_link(
            "output",
            PortLink {
                step: StepIndex(2),
                port: "input".to_string(),
            },
        );
        step.add_link(
            "output",
            PortLink {
                step: StepIndex(3),
                port: "input".to_string(),
            },
        );

        assert_eq!(step.links("output").len(), 2);
        assert!(step.links("other").is_empty());
    }
}
