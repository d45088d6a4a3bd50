//! Error types for bountyx.
//!
//! Uses `thiserror` for ergonomic error definitions. Only [`ReconError`]
//! ever aborts a run; probe failures and merge conflicts are recorded as
//! diagnostics and travel with the run report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors surfaced by the pipeline coordinator.
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("invalid target '{0}': expected a domain, IPv4 address or IPv4 CIDR range")]
    InvalidTarget(String),

    #[error("no prober is registered for any of the selected stages")]
    NoProbersAvailable,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for pipeline operations.
pub type ReconResult<T> = Result<T, ReconError>;

/// Classification of a failed prober call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailureKind {
    /// The call exceeded its time budget or was cancelled.
    Timeout,
    /// The backing tool or service failed.
    ExternalToolError,
    /// The prober could not work with the target set or options it was given.
    InvalidInput,
}

impl ProbeFailureKind {
    /// Whether a failure of this kind means the prober did not run successfully.
    ///
    /// Timeouts keep whatever was emitted before expiry, so they do not count
    /// against the stage.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Timeout)
    }
}

impl fmt::Display for ProbeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ExternalToolError => write!(f, "external tool error"),
            Self::InvalidInput => write!(f, "invalid input"),
        }
    }
}

/// Failure of a single prober call. Local to that call, never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct ProbeFailure {
    pub kind: ProbeFailureKind,
    pub detail: String,
}

impl ProbeFailure {
    pub fn new(kind: ProbeFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ProbeFailureKind::Timeout, detail)
    }

    pub fn tool(detail: impl Into<String>) -> Self {
        Self::new(ProbeFailureKind::ExternalToolError, detail)
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ProbeFailureKind::InvalidInput, detail)
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Run persistence errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage directory error: {0}")]
    DirectoryError(String),

    #[error("failed to save run: {0}")]
    SaveFailed(String),

    #[error("failed to load run: {0}")]
    LoadFailed(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("ambiguous run reference '{0}': {1} matches")]
    Ambiguous(String, usize),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by CLI subcommands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Recon(#[from] ReconError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
