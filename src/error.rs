// ABOUTME: Typed errors for initialization script execution
// ABOUTME: Tags batch failures by kind so callers can branch on transient I/O

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why an initialization script stopped
///
/// Batches are numbered from 1 in the order they appear in the script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Batch {batch} failed with an I/O error while talking to the server: {source}")]
    Io {
        batch: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Batch {batch} failed: {source}")]
    Database {
        batch: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Batch {batch} timed out after {timeout:?}")]
    Timeout { batch: usize, timeout: Duration },
}

impl ScriptError {
    /// Classify a driver error raised while executing `batch`
    pub fn from_driver(batch: usize, source: tokio_postgres::Error) -> Self {
        // A dropped socket surfaces on the request as `Closed`; the io::Error
        // itself goes to the connection task
        if source.is_closed() || has_io_cause(&source) {
            ScriptError::Io { batch, source }
        } else {
            ScriptError::Database { batch, source }
        }
    }

    /// The failure came from the transport rather than from the SQL itself
    pub fn is_io(&self) -> bool {
        matches!(self, ScriptError::Io { .. })
    }

    /// Batch that failed, if the failure happened while executing one
    pub fn batch(&self) -> Option<usize> {
        match self {
            ScriptError::Read { .. } => None,
            ScriptError::Io { batch, .. }
            | ScriptError::Database { batch, .. }
            | ScriptError::Timeout { batch, .. } => Some(*batch),
        }
    }
}

/// Whether any error in the `source()` chain is an [`io::Error`]
pub fn has_io_cause(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.is::<io::Error>() {
            return true;
        }
        current = err.source();
    }
    false
}
