// Centralized error handling module
// Context-rich error types for codec, format, and reconciliation failures

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for the checksum engine
#[derive(Debug)]
pub enum HashKeepError {
    /// Digest text could not be decoded under the selected encoding
    MalformedDigestText { text: String, reason: String },

    /// A file scheduled for hashing could not be opened or read
    FileInaccessible { path: PathBuf, operation: String, source: io::Error },

    /// The root path of a run is itself unavailable; aborts the whole run
    RootUnavailable { path: PathBuf, source: io::Error },

    /// Requested algorithm has no registered hasher backend
    UnsupportedAlgorithm { algorithm: String },

    /// Generic I/O failure with operation context
    Io { path: Option<PathBuf>, operation: String, source: io::Error },
}

/// A recoverable, line-level checksum file format violation.
/// Warnings are collected and reported in aggregate; they never abort parsing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParseWarning {
    /// 1-based line number in the checksum file
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl fmt::Display for HashKeepError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HashKeepError::MalformedDigestText { text, reason } => {
                write!(f, "Malformed digest text {:?}: {}", text, reason)
            }
            HashKeepError::FileInaccessible { path, operation, source } => {
                write!(f, "Cannot access {} while {}: {}", path.display(), operation, source)
            }
            HashKeepError::RootUnavailable { path, source } => {
                write!(f, "Root path unavailable: {}: {}", path.display(), source)
            }
            HashKeepError::UnsupportedAlgorithm { algorithm } => {
                write!(f, "Unsupported hash algorithm: {}", algorithm)
            }
            HashKeepError::Io { path, operation, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error while {} {}: {}", operation, p.display(), source)
                } else {
                    write!(f, "I/O error while {}: {}", operation, source)
                }
            }
        }
    }
}

impl std::error::Error for HashKeepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HashKeepError::FileInaccessible { source, .. } => Some(source),
            HashKeepError::RootUnavailable { source, .. } => Some(source),
            HashKeepError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl HashKeepError {
    /// Create an error from an io::Error with context about the operation.
    /// Open/read/permission failures on a known file map to `FileInaccessible`.
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match path {
            Some(path)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                HashKeepError::FileInaccessible {
                    path,
                    operation: operation.to_string(),
                    source: err,
                }
            }
            path => HashKeepError::Io {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }
}

impl From<io::Error> for HashKeepError {
    fn from(err: io::Error) -> Self {
        HashKeepError::from_io_error(err, "unknown operation", None)
    }
}
