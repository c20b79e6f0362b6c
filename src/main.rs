//! StepFlow Task Executor
//!
//! Runs one serialized task context in the current process: the command a
//! cluster backend schedules on its compute nodes. Loading the context
//! restores the submitting process's settings, the task's module is
//! resolved from the registry and executed, and the result, the produced
//! output-data map and a done-marker file are written next to the context
//! file.
//!
//! # Usage
//!
//! ```bash
//! # Execute a serialized task context
//! stepflow task_42.context
//!
//! # With debug logging
//! stepflow task_42.context --verbose
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};

use stepflow::execution::TaskContext;
use stepflow::module::ModuleRegistry;
use stepflow::TaskRunner;
use stepflow::{APP_NAME, VERSION};

/// Extension of the result file written next to the context file.
const RESULT_EXTENSION: &str = "result";

/// Extension of the output-data map written next to the context file.
const DATA_EXTENSION: &str = "data";

/// Extension of the done-marker file.
const DONE_EXTENSION: &str = "done";

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    context_path: Option<PathBuf>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Task Executor");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stepflow [OPTIONS] <CONTEXT_FILE>");
    println!();
    println!("Arguments:");
    println!("  <CONTEXT_FILE>  Path to a serialized task context");
    println!();
    println!("Options:");
    println!("  --verbose       Enable debug logging");
    println!("  --help          Show this help message");
    println!("  --version       Show version information");
    println!();
    println!("Examples:");
    println!("  stepflow task_42.context");
    println!("  stepflow task_42.context --verbose");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.context_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.context_path = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(config)
}

/// Executes one serialized task and writes its artifacts.
fn execute_task(context_path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    // Loading the context replaces the global settings with the record of
    // the submitting process.
    let context = TaskContext::load(context_path)?;

    info!(
        "Loaded task {} ({}) of step '{}' (module '{}')",
        context.id(),
        context.context_name(),
        context.step_id(),
        context.module_name()
    );

    let registry = ModuleRegistry::with_builtins();
    let mut module = registry.create(context.module_name())?;
    module
        .configure(context.parameters())
        .map_err(|e| format!("module '{}' failed to configure: {}", context.module_name(), e))?;

    let mut runner = TaskRunner::new(context, module);
    let result = runner.run()?.clone();

    let result_path = context_path.with_extension(RESULT_EXTENSION);
    result.save(&result_path)?;
    info!("Wrote result: {}", result_path.display());

    let data_path = context_path.with_extension(DATA_EXTENSION);
    let outputs = serde_json::to_string_pretty(runner.context().outputs())?;
    fs::write(&data_path, outputs)?;
    info!("Wrote output data: {}", data_path.display());

    let done_path = context_path.with_extension(DONE_EXTENSION);
    fs::write(&done_path, "")?;

    if let Some(message) = result.error_message() {
        error!("Task {} failed: {}", result.task_id(), message);
    } else {
        info!(
            "Task {} finished successfully in {:.2?}",
            result.task_id(),
            result.duration()
        );
    }

    Ok(result.is_success())
}

/// Main application entry point.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let Some(context_path) = config.context_path else {
        print_usage();
        return Err("Missing task context file argument".into());
    };

    execute_task(&context_path)
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!();
            eprintln!("{} task failed; see result file for details", "Error:".red().bold());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("stepflow")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_context_path() {
        let config = parse_arguments(&args(&["task_42.context"])).unwrap();
        assert_eq!(config.context_path, Some(PathBuf::from("task_42.context")));
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_verbose_flag() {
        let config = parse_arguments(&args(&["task_42.context", "--verbose"])).unwrap();
        assert!(config.verbose);
    }

    #[test]
    fn test_parse_unknown_option() {
        assert!(parse_arguments(&args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn test_parse_extra_positional() {
        assert!(parse_arguments(&args(&["a.context", "b.context"])).is_err());
    }

    #[test]
    fn test_execute_task_missing_file() {
        let result = execute_task(Path::new("/nonexistent/task.context"));
        assert!(result.is_err());
    }

    #[test]
    fn test_artifact_extensions_are_distinct() {
        let context = Path::new("/work/task_42.context");
        assert_eq!(
            context.with_extension(RESULT_EXTENSION),
            Path::new("/work/task_42.result")
        );
        assert_eq!(
            context.with_extension(DATA_EXTENSION),
            Path::new("/work/task_42.data")
        );
        assert_eq!(
            context.with_extension(DONE_EXTENSION),
            Path::new("/work/task_42.done")
        );
    }
}
