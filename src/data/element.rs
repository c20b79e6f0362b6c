//! Data Elements
//!
//! A data element binds a name and a format to one or more files. Elements
//! are what tokens carry across port links and what task contexts hand to
//! module implementations.

use serde::{Deserialize, Serialize};

use super::file::DataFile;
use super::format::DataFormat;

/// A named unit of data flowing through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    name: String,
    format: DataFormat,
    files: Vec<DataFile>,
}

impl Data {
    /// Creates an element with no files attached yet.
    pub fn new(name: impl Into<String>, format: DataFormat) -> Self {
        Self {
            name: name.into().trim().to_string(),
            format,
            files: Vec::new(),
        }
    }

    /// Attaches a file to this element.
    pub fn with_file(mut self, file: DataFile) -> Self {
        self.files.push(file);
        self
    }

    /// Attaches several files to this element.
    pub fn with_files(mut self, files: Vec<DataFile>) -> Self {
        self.files.extend(files);
        self
    }

    /// Returns the element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the element format.
    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    /// Returns the attached files.
    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    /// Returns the first attached file, if any.
    pub fn first_file(&self) -> Option<&DataFile> {
        self.files.first()
    }
}

impl std::fmt::Display for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.format)
    }
}
