//! Error types for veil-core
//!
//! Two families live here. [`Error`] covers everything that can go wrong while
//! building a [`ProtectionConfig`](crate::ProtectionConfig); it is fatal to a run
//! and surfaces before any target file is touched. [`FileError`] covers the
//! per-target failures that the pipeline records and moves past.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for veil-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. Any of these aborts the run before file I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse the YAML document (includes type mismatches such as a
    /// non-string target or an unknown `identifierStrategy`)
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// A value parsed but violates a constraint
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// The selected profile name is neither user-defined nor built in
    #[error("unknown profile '{name}' (available: {available})")]
    UnknownProfile {
        /// Requested profile name
        name: String,
        /// Comma-separated list of names that would have been accepted
        available: String,
    },

    /// IO error while reading the configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }
}

/// Failure reported by a [`TransformationEngine`](crate::TransformationEngine)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine '{engine}' rejected input: {message}")]
pub struct TransformError {
    /// Name of the engine that failed
    pub engine: String,
    /// Description of the failure
    pub message: String,
}

impl TransformError {
    /// Create a new transform error
    pub fn new(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

/// Which side of the read/transform/write cycle an IO failure hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStage {
    /// Reading the current content
    Read,
    /// Overwriting with transformed content
    Write,
}

impl std::fmt::Display for IoStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Per-file failure. Recorded by the pipeline, never propagated out of a run.
#[derive(Error, Debug)]
pub enum FileError {
    /// The target does not resolve to an existing file
    #[error("target not found: {path}")]
    Missing {
        /// Resolved path that was checked
        path: PathBuf,
    },

    /// The engine could not process the content
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Reading or writing an existing file failed
    #[error("failed to {stage} {path}: {source}")]
    Io {
        /// Which operation failed
        stage: IoStage,
        /// Resolved path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file did not finish within the configured per-file timeout
    #[error("timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed, in seconds
        secs: u64,
    },
}
