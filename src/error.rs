//! Agent-wide error taxonomy.
//!
//! # Design Decisions
//! - Startup errors are returned to `main`, which exits non-zero
//! - Steady-state errors are logged by the reconciler and the event is dropped
//! - Comparing backends of different variants is not an error (see `runtime`)

use std::path::PathBuf;
use thiserror::Error;

use crate::node::service::ServiceControlError;
use crate::snapshot::SnapshotError;
use crate::watch::SourceError;

/// Errors surfaced by the reconciliation core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Unknown or unsupported runtime backend key.
    #[error("unsupported runtime type: {0}")]
    UnsupportedRuntime(String),

    /// Directory or file create/read/write failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed runtime configuration file.
    #[error("failed to parse runtime config '{path}': {source}")]
    RuntimeConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Backend state could not be rendered to its native format.
    #[error("failed to serialize runtime config: {0}")]
    RuntimeConfigSerialize(#[from] toml::ser::Error),

    /// Malformed snapshot.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Reload/restart of the managed service failed or timed out.
    #[error(transparent)]
    ServiceControl(#[from] ServiceControlError),

    /// The remote source could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl AgentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for core operations.
pub type AgentResult<T> = Result<T, AgentError>;
