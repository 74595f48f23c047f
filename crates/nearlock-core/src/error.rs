//! Error types for the core state machines.

use thiserror::Error;

use crate::attempt::AttemptState;

/// Failures of a preference storage backend.
///
/// The service never propagates these: a failed write is logged and the
/// in-memory decision stands.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("preference I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored preferences could not be encoded or decoded.
    #[error("preference encoding failed: {0}")]
    Encoding(String),
}

/// Reasons an authentication attempt refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The attempt already left its initial state.
    #[error("attempt cannot start from state {state:?}")]
    InvalidState {
        /// State the attempt was in.
        state: AttemptState,
    },

    /// There is no locked screen to authenticate against.
    #[error("screen is not locked")]
    ScreenNotLocked,

    /// The lock screen is not offering click-to-unlock for this user.
    #[error("lock screen is not in click-to-unlock mode")]
    NotClickToUnlock,

    /// The companion app is not loaded, so nobody can answer the attempt.
    #[error("companion app is not loaded")]
    AppNotLoaded,
}
