//! Error types for ao-coverage core.

use std::io;

use thiserror::Error;

/// Error type for ao-coverage core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A path segment that would escape the artifact tree.
    #[error("invalid path segment: {0:?}")]
    InvalidSegment(String),
    /// A catch-all error with a message.
    #[error("{0}")]
    Other(String),
}

/// A report body that the claimed format could not read.
///
/// This is the only failure mode of format parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid report document")]
pub struct InvalidReportDocument;

/// Convenience result type for ao-coverage core.
pub type Result<T> = std::result::Result<T, CoreError>;
