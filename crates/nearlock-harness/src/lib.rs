//! Deterministic simulation harness for Nearlock.
//!
//! Drives the real [`nearlock_core::UnlockService`] against fake
//! collaborators and a virtual clock. Asynchronous replies are queued and
//! delivered on demand, in order or shuffled by a seeded RNG, which makes
//! interleavings like "fetch reply arrives after a user switch" reproducible.

#![forbid(unsafe_code)]

pub mod scenario;
pub mod sim_env;
pub mod world;

pub use sim_env::SimEnv;
pub use world::{Completion, SimWorld};
