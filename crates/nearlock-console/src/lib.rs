//! Console frontend for Nearlock
//!
//! A thin shell over [`nearlock_app::Runtime`]: commands typed on stdin become
//! [`nearlock_core::ServiceEvent`]s, and the platform collaborators only log
//! what they are asked to do.

#![forbid(unsafe_code)]

pub mod collaborators;
pub mod commands;
pub mod status;

use thiserror::Error;

pub use collaborators::ConsoleCollaborators;
pub use commands::{Command, parse};
pub use status::status_line;

/// Errors ending the console.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The runtime failed or went away.
    #[error(transparent)]
    Runtime(#[from] nearlock_app::RuntimeError),

    /// Terminal I/O failed.
    #[error("terminal i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime task panicked or was cancelled.
    #[error("runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
