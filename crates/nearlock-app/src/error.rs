//! Runtime errors.

use std::path::PathBuf;

use nearlock_core::StorageError;
use thiserror::Error;

/// Errors surfaced by the runtime and the file preference store.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime's event loop has stopped.
    #[error("runtime event loop is closed")]
    Closed,

    /// The preference file could not be opened.
    #[error("failed to open preferences at {path}: {source}")]
    OpenPreferences {
        /// File that failed to open.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: StorageError,
    },
}
