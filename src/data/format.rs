//! Data Formats and Compressions
//!
//! Lightweight descriptions of the data flowing through ports. A format is
//! a name plus a default file extension; the engine only compares formats
//! for equality when linking ports, it never inspects file contents.

use serde::{Deserialize, Serialize};

/// A named data format with its default file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFormat {
    name: String,
    extension: String,
}

impl DataFormat {
    /// Creates a format from a name and a file extension.
    ///
    /// The extension is normalized to start with a dot.
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = if extension.is_empty() || extension.starts_with('.') {
            extension
        } else {
            format!(".{}", extension)
        };

        Self {
            name: name.into().trim().to_lowercase(),
            extension,
        }
    }

    /// Plain text lines.
    pub fn text() -> Self {
        Self::new("text", ".txt")
    }

    /// Raw sequencing reads.
    pub fn reads_fastq() -> Self {
        Self::new("reads_fastq", ".fastq")
    }

    /// Read alignments.
    pub fn alignments_sam() -> Self {
        Self::new("alignments_sam", ".sam")
    }

    /// Tab-separated expression values.
    pub fn expression_tsv() -> Self {
        Self::new("expression_tsv", ".tsv")
    }

    /// Returns the format name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default file extension, including the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Compression applied to the files of a data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl CompressionType {
    /// Returns the file extension for this compression, empty for none.
    pub fn extension(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
        }
    }

    /// Infers the compression from a file name.
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".bz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        };
        write!(f, "{}", name)
    }
}
