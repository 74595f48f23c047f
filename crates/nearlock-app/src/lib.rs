//! Application runtime for Nearlock
//!
//! Executes the actions of [`nearlock_core::UnlockService`] against platform
//! collaborators and feeds their completions back as events.
//!
//! # Components
//!
//! - [`Runtime`]: single-owner event loop around the service
//! - [`collaborators`]: traits for the companion app, key preparation, the
//!   trusted device registry, the lock screen, the radio and the remote
//!   turn-off endpoint
//! - [`FilePreferences`]: CBOR file preference store
//! - [`SystemEnv`]: tokio-backed [`nearlock_core::Environment`]

pub mod collaborators;
mod env;
mod error;
mod runtime;
mod storage;

pub use collaborators::{
    Collaborators, CompanionApp, KeyPreparer, LockScreenBridge, NoRadioAdapter, RadioAdapter,
    RemoteToggle, TrustedDeviceRegistry,
};
pub use env::SystemEnv;
pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeHandle};
pub use storage::FilePreferences;
