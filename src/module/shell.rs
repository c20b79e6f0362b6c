//! Shell Command Module
//!
//! Built-in module running a shell command per task, with placeholder
//! substitution for the task's input and output files. Commands are
//! written to a temporary script so multi-line commands and shell
//! constructs work unmodified.
//!
//! # Parameters
//!
//! - `command` (required): command template; `{input}`/`{inputs}` and
//!   `{output}`/`{outputs}` expand to space-separated file lists
//! - `source`: set to `true` for a step with no input port (the command
//!   produces data from nothing, e.g. a download)
//! - `input.format` / `input.extension`: input port format (default text)
//! - `input.list`: set to `true` to aggregate all upstream elements into
//!   one task input
//! - `output.format` / `output.extension`: output port format
//! - `output.compression`: `none`, `gzip` or `bzip2`

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use log::{debug, warn};

use crate::data::{CompressionType, DataFormat};
use crate::execution::context::TaskContext;
use crate::execution::result::TaskStatus;
use crate::settings::Settings;
use crate::workflow::port::{InputPort, OutputPort};

use super::{Module, ModuleError, ParameterSet};

/// Runs one shell command per task.
pub struct ShellModule {
    command: String,
    source: bool,
    input_format: DataFormat,
    input_list: bool,
    output_format: DataFormat,
    output_compression: CompressionType,
}

impl ShellModule {
    pub fn new() -> Self {
        Self {
            command: String::new(),
            source: false,
            input_format: DataFormat::text(),
            input_list: false,
            output_format: DataFormat::text(),
            output_compression: CompressionType::None,
        }
    }
}

impl Default for ShellModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ShellModule {
    fn configure(&mut self, parameters: &ParameterSet) -> Result<(), ModuleError> {
        let command = parameters
            .get("command")
            .ok_or("shell module requires a 'command' parameter")?;
        if command.trim().is_empty() {
            return Err("shell module 'command' parameter is empty".into());
        }
        self.command = command.trim().to_string();

        self.source = parameters.get_or("source", "false") == "true";
        self.input_format = DataFormat::new(
            parameters.get_or("input.format", "text"),
            parameters.get_or("input.extension", ".txt"),
        );
        self.input_list = parameters.get_or("input.list", "false") == "true";
        self.output_format = DataFormat::new(
            parameters.get_or("output.format", "text"),
            parameters.get_or("output.extension", ".txt"),
        );

        self.output_compression = match parameters.get_or("output.compression", "none") {
            "none" => CompressionType::None,
            "gzip" => CompressionType::Gzip,
            "bzip2" => CompressionType::Bzip2,
            other => return Err(format!("unknown compression '{}'", other).into()),
        };

        Ok(())
    }

    fn execute(&self, context: &TaskContext, status: &mut TaskStatus) -> Result<(), ModuleError> {
        let input_files = collect_files(context, "input");
        let output_files: Vec<String> = context
            .output_data("output")
            .map(|data| {
                data.files()
                    .iter()
                    .map(|f| f.path().display().to_string())
                    .collect()
            })
            .unwrap_or_default();

        ensure_output_directories(&output_files)?;

        let inputs_str = input_files.join(" ");
        let outputs_str = output_files.join(" ");

        let command_text = self
            .command
            .replace("{input}", &inputs_str)
            .replace("{output}", &outputs_str)
            .replace("{inputs}", &inputs_str)
            .replace("{outputs}", &outputs_str);

        let script_path = create_execution_script(&context.file_prefix(), &command_text)?;

        debug!(
            "Task {} running command: {}",
            context.id(),
            command_text
        );

        let output = Command::new("bash").arg(&script_path).output()?;

        if let Err(e) = fs::remove_file(&script_path) {
            warn!("Failed to clean up script {}: {}", script_path.display(), e);
        }

        status.set_counter("input files", input_files.len() as u64);
        status.set_counter("output files", output_files.len() as u64);

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                debug!("Task {} output:\n{}", context.id(), stdout);
            }
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "command exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )
            .into())
        }
    }

    fn input_ports(&self) -> Vec<InputPort> {
        if self.source {
            return Vec::new();
        }

        let port = InputPort::new("input", self.input_format.clone())
            .expect("static port name is valid")
            .accept(CompressionType::Gzip)
            .accept(CompressionType::Bzip2);
        vec![if self.input_list { port.list() } else { port }]
    }

    fn output_ports(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.output_format.clone())
            .expect("static port name is valid")
            .compress(self.output_compression)]
    }
}

/// Collects the paths of every file of every element on an input port.
fn collect_files(context: &TaskContext, port: &str) -> Vec<String> {
    context
        .input_data(port)
        .map(|elements| {
            elements
                .iter()
                .flat_map(|data| data.files())
                .map(|f| f.path().display().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Creates parent directories for output files.
fn ensure_output_directories(output_files: &[String]) -> Result<(), ModuleError> {
    for output_file in output_files {
        if output_file.is_empty() {
            continue;
        }
        if let Some(parent) = PathBuf::from(output_file).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                debug!("Created directory: {}", parent.display());
            }
        }
    }
    Ok(())
}

/// Writes the command into a temporary bash script.
fn create_execution_script(prefix: &str, command_text: &str) -> Result<PathBuf, ModuleError> {
    let script_dir = Settings::current().temp_directory().join("stepflow_scripts");
    fs::create_dir_all(&script_dir)?;

    let script_path = script_dir.join(format!("{}.sh", prefix));
    let mut file = File::create(&script_path)?;

    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", command_text)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}
