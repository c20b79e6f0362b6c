//! Step Ports
//!
//! Named, typed slots through which data tokens enter and leave a step.
//! Port names are lowercase identifiers, unique within a step without
//! regard to case; a port's format and list-ness are fixed once the step
//! is configured.

use crate::data::{CompressionType, DataFormat};
use crate::error::EngineError;

/// Validates a port name and returns its normalized (lowercase) form.
///
/// Names must start with a letter and contain only lowercase letters,
/// digits or underscores.
pub fn validate_port_name(name: &str) -> Result<String, EngineError> {
    let normalized = name.trim().to_lowercase();

    let mut chars = normalized.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(normalized)
    } else {
        Err(EngineError::InvalidPortName(name.to_string()))
    }
}

/// An input slot on a step.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPort {
    name: String,
    format: DataFormat,
    list: bool,
    accepted_compressions: Vec<CompressionType>,
    required_in_working_directory: bool,
}

impl InputPort {
    /// Creates an input port accepting uncompressed data.
    pub fn new(name: &str, format: DataFormat) -> Result<Self, EngineError> {
        Ok(Self {
            name: validate_port_name(name)?,
            format,
            list: false,
            accepted_compressions: vec![CompressionType::None],
            required_in_working_directory: false,
        })
    }

    /// Marks the port as accepting multiple data elements, delivered
    /// together once the upstream step has finished producing.
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    /// Adds an accepted compression.
    pub fn accept(mut self, compression: CompressionType) -> Self {
        if !self.accepted_compressions.contains(&compression) {
            self.accepted_compressions.push(compression);
        }
        self
    }

    /// Requires incoming data to reside in the step's working directory.
    pub fn require_in_working_directory(mut self) -> Self {
        self.required_in_working_directory = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn accepted_compressions(&self) -> &[CompressionType] {
        &self.accepted_compressions
    }

    pub fn accepts_compression(&self, compression: CompressionType) -> bool {
        self.accepted_compressions.contains(&compression)
    }

    pub fn is_required_in_working_directory(&self) -> bool {
        self.required_in_working_directory
    }
}

/// An output slot on a step.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPort {
    name: String,
    format: DataFormat,
    list: bool,
    compression: CompressionType,
}

impl OutputPort {
    /// Creates an uncompressed output port.
    pub fn new(name: &str, format: DataFormat) -> Result<Self, EngineError> {
        Ok(Self {
            name: validate_port_name(name)?,
            format,
            list: false,
            compression: CompressionType::None,
        })
    }

    /// Marks the port as producing a list of data elements.
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    /// Sets the compression applied to the port's output files.
    pub fn compress(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_name_validation() {
        assert_eq!(validate_port_name("input").unwrap(), "input");
        assert_eq!(validate_port_name("reads_1").unwrap(), "reads_1");
        assert_eq!(validate_port_name("READS").unwrap(), "reads");

        assert!(validate_port_name("").is_err());
        assert!(validate_port_name("1reads").is_err());
        assert!(validate_port_name("my port").is_err());
        assert!(validate_port_name("my-port").is_err());
    }

    #[test]
    fn test_input_port_defaults() {
        let port = InputPort::new("input", DataFormat::reads_fastq()).unwrap();

        assert_eq!(port.name(), "input");
        assert!(!port.is_list());
        assert!(port.accepts_compression(CompressionType::None));
        assert!(!port.accepts_compression(CompressionType::Gzip));
        assert!(!port.is_required_in_working_directory());
    }

    #[test]
    fn test_input_port_builder() {
        let port = InputPort::new("reads", DataFormat::reads_fastq())
            .unwrap()
            .list()
            .accept(CompressionType::Gzip)
            .require_in_working_directory();

        assert!(port.is_list());
        assert!(port.accepts_compression(CompressionType::Gzip));
        assert!(port.accepts_compression(CompressionType::None));
        assert!(port.is_required_in_working_directory());
    }

    #[test]
    fn test_input_port_accept_is_idempotent() {
        let port = InputPort::new("reads", DataFormat::text())
            .unwrap()
            .accept(CompressionType::Gzip)
            .accept(CompressionType::Gzip);

        assert_eq!(port.accepted_compressions().len(), 2);
    }

    #[test]
    fn test_output_port_defaults() {
        let port = OutputPort::new("output", DataFormat::alignments_sam()).unwrap();

        assert_eq!(port.name(), "output");
        assert!(!port.is_list());
        assert_eq!(port.compression(), CompressionType::None);
    }

    #[test]
    fn test_output_port_compression() {
        let port = OutputPort::new("output", DataFormat::reads_fastq())
            .unwrap()
            .compress(CompressionType::Gzip);

        assert_eq!(port.compression(), CompressionType::Gzip);
    }

    #[test]
    fn test_port_name_is_case_normalized() {
        let port = InputPort::new("Input", DataFormat::text()).unwrap();
        assert_eq!(port.name(), "input");
    }
}
