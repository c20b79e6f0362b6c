//! Task Contexts
//!
//! A task context is the complete description of one task: which step it
//! belongs to, which module to run, and the resolved input/output data
//! bindings for this one execution. Contexts are self-contained and
//! serializable, so a task can be shipped to and executed by a separate
//! process.
//!
//! Loading a serialized context restores the global [`Settings`] of the
//! process that created it. This is a side effect by design: code running
//! inside the task resolves temporary paths and run options from the
//! global record, and the out-of-process execution path depends on both
//! processes seeing the same configuration.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::data::Data;
use crate::error::EngineError;
use crate::module::ParameterSet;
use crate::settings::Settings;
use crate::workflow::step::Step;

/// Extension of per-task log files.
pub const LOG_FILE_EXTENSION: &str = ".log";

/// Process-wide task counter.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// The resolved description of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    id: u64,
    step_number: u64,
    step_id: String,
    module_name: String,
    context_name: String,
    parameters: ParameterSet,
    inputs: HashMap<String, Vec<Data>>,
    outputs: HashMap<String, Data>,
    output_directory: PathBuf,
    task_directory: PathBuf,
    create_log: bool,
}

/// On-disk record pairing a task context with the settings of the process
/// that created it.
#[derive(Serialize, Deserialize)]
struct SerializedTask {
    settings: Settings,
    context: TaskContext,
}

impl TaskContext {
    /// Creates a context for one task of a step.
    pub(crate) fn new(
        step: &Step,
        inputs: HashMap<String, Vec<Data>>,
        outputs: HashMap<String, Data>,
    ) -> Self {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst) + 1;
        let context_name = derive_context_name(&inputs, id);

        Self {
            id,
            step_number: step.number(),
            step_id: step.id().to_string(),
            module_name: step.module_name().to_string(),
            context_name,
            parameters: step.parameters().clone(),
            inputs,
            outputs,
            output_directory: step.output_directory().to_path_buf(),
            task_directory: step.task_directory().to_path_buf(),
            create_log: step.creates_log(),
        }
    }

    /// Process-wide unique task id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Numeric id of the owning step.
    pub fn step_number(&self) -> u64 {
        self.step_number
    }

    /// String id of the owning step.
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Human-readable name of this task, derived from the input data.
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Returns the data elements bound to an input port.
    pub fn input_data(&self, port: &str) -> Option<&[Data]> {
        self.inputs.get(&port.to_lowercase()).map(Vec::as_slice)
    }

    /// Returns the data element bound to an output port.
    pub fn output_data(&self, port: &str) -> Option<&Data> {
        self.outputs.get(&port.to_lowercase())
    }

    pub fn inputs(&self) -> &HashMap<String, Vec<Data>> {
        &self.inputs
    }

    pub fn outputs(&self) -> &HashMap<String, Data> {
        &self.outputs
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn task_directory(&self) -> &Path {
        &self.task_directory
    }

    pub fn creates_log(&self) -> bool {
        self.create_log
    }

    /// Deterministic per-task file prefix.
    pub fn file_prefix(&self) -> String {
        format!("{}_task_{}", self.step_id, self.id)
    }

    /// Path of this task's log file under the step's task directory.
    pub fn log_path(&self) -> PathBuf {
        self.task_directory
            .join(format!("{}{}", self.file_prefix(), LOG_FILE_EXTENSION))
    }

    /// Serializes this context, together with the current global settings,
    /// into one JSON file.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let record = SerializedTask {
            settings: Settings::current(),
            context: self.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Loads a serialized context and **replaces the process settings**
    /// with the record stored next to it.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::ContextFileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let record: SerializedTask = serde_json::from_str(&content)?;

        Settings::replace(record.settings);
        Ok(record.context)
    }
}

/// Names a task after its input data, falling back to file names, falling
/// back to a generic task name.
fn derive_context_name(inputs: &HashMap<String, Vec<Data>>, task_id: u64) -> String {
    let mut names: Vec<&str> = inputs
        .values()
        .flatten()
        .map(Data::name)
        .filter(|n| !n.is_empty())
        .collect();
    names.sort_unstable();
    names.dedup();

    if !names.is_empty() {
        return names.join("-");
    }

    let mut file_names: Vec<&str> = inputs
        .values()
        .flatten()
        .flat_map(Data::files)
        .filter_map(|f| f.stem())
        .collect();
    file_names.sort_unstable();
    file_names.dedup();

    if !file_names.is_empty() {
        return file_names.join("-");
    }

    format!("task-{}", task_id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{DataFile, DataFormat};
    use crate::module::ModuleCapabilities;
    use crate::workflow::step::StepType;

    pub(crate) fn test_step() -> Step {
        Step::new(
            "teststep",
            StepType::Standard,
            "shell",
            ParameterSet::new().with("command", "true"),
            ModuleCapabilities::default(),
        )
    }

    pub(crate) fn test_context() -> TaskContext {
        let mut inputs = HashMap::new();
        inputs.insert(
            "input".to_string(),
            vec![Data::new("sample1", DataFormat::text())
                .with_file(DataFile::new("/data/sample1.txt"))],
        );
        let mut outputs = HashMap::new();
        outputs.insert(
            "output".to_string(),
            Data::new("sample1", DataFormat::text())
                .with_file(DataFile::new("/data/out/sample1.txt")),
        );
        TaskContext::new(&test_step(), inputs, outputs)
    }

    #[test]
    fn test_task_ids_are_unique() {
        let first = test_context();
        let second = test_context();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_context_name_from_input_data() {
        let context = test_context();
        assert_eq!(context.context_name(), "sample1");
    }

    #[test]
    fn test_context_name_falls_back_to_file_names() {
        let mut inputs = HashMap::new();
        inputs.insert(
            "input".to_string(),
            vec![Data::new("", DataFormat::text())
                .with_file(DataFile::new("/data/lane3.txt"))],
        );
        let context = TaskContext::new(&test_step(), inputs, HashMap::new());

        assert_eq!(context.context_name(), "lane3");
    }

    #[test]
    fn test_context_name_generic_fallback() {
        let context = TaskContext::new(&test_step(), HashMap::new(), HashMap::new());
        assert_eq!(context.context_name(), format!("task-{}", context.id()));
    }

    #[test]
    fn test_port_lookup_is_case_insensitive() {
        let context = test_context();
        assert!(context.input_data("INPUT").is_some());
        assert!(context.output_data("Output").is_some());
        assert!(context.input_data("missing").is_none());
    }

    #[test]
    fn test_log_path_uses_prefix_and_extension() {
        let context = test_context();
        let path = context.log_path();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert_eq!(name, format!("{}.log", context.file_prefix()));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        use tempfile::tempdir;

        let _guard = crate::settings::test_lock();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("task.context");

        let context = test_context();
        context.save(&path).unwrap();

        let loaded = TaskContext::load(&path).unwrap();
        assert_eq!(loaded.id(), context.id());
        assert_eq!(loaded.step_id(), context.step_id());
        assert_eq!(loaded.module_name(), context.module_name());
        assert_eq!(loaded.inputs(), context.inputs());
    }

    #[test]
    fn test_load_replaces_global_settings() {
        use tempfile::tempdir;

        let _guard = crate::settings::test_lock();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("task.context");

        let mut settings = Settings::current();
        settings.set("context.load.marker", "restored");
        Settings::replace(settings);

        test_context().save(&path).unwrap();

        let mut settings = Settings::current();
        settings.set("context.load.marker", "overwritten");
        Settings::replace(settings);

        TaskContext::load(&path).unwrap();
        assert_eq!(
            Settings::current().get("context.load.marker"),
            Some("restored")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = TaskContext::load(Path::new("/nonexistent/task.context"));
        assert!(matches!(
            result,
            Err(EngineError::ContextFileNotFound(_))
        ));
    }
}
