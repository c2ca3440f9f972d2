//! Error types for parsing and report serialization.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for parser and reconciliation operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while turning on-disk telemetry into typed records.
///
/// Each failure condition is a distinct variant carrying the offending
/// path so callers can branch on failure kind.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file exists in the directory listing but cannot be read.
    #[error("error reading the file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed XML.
    #[error("error parsing the XML in file {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    /// The document parsed but does not match the expected record shape.
    #[error("unexpected value or schema in the file {}: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },

    /// A test-case child tag outside the closed vocabulary. Signals an
    /// unhandled report dialect rather than corrupt data.
    #[error("could not parse the file {}, unexpected tag: {tag}", path.display())]
    UnexpectedTag { path: PathBuf, tag: String },

    /// A job subdirectory whose name is not an integer job number.
    #[error("invalid job directory {}: expected an integer job number", path.display())]
    JobDirectory { path: PathBuf },

    /// A job timestamp that does not match `YYYY-MM-DDTHH:MM:SSZ`.
    #[error("invalid timestamp {value:?} for job {job}")]
    Timestamp { job: u64, value: String },
}

impl ParseError {
    /// Returns true if this is a schema/shape mismatch.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    /// Returns true if this error signals an unhandled dialect variant.
    pub fn is_unexpected_tag(&self) -> bool {
        matches!(self, Self::UnexpectedTag { .. })
    }

    /// The file or directory the error refers to, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. }
            | Self::Xml { path, .. }
            | Self::Schema { path, .. }
            | Self::UnexpectedTag { path, .. }
            | Self::JobDirectory { path } => Some(path),
            Self::Timestamp { .. } => None,
        }
    }
}

/// Errors raised while writing the CSV report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("error creating directories for the report file: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("the report file cannot be created or written to: {0}")]
    Io(#[source] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}
