//! Environment abstraction for time.
//!
//! State machines never read the clock themselves; they take `now` as a
//! parameter. The runtime and the simulation harness obtain it from an
//! [`Environment`], which lets tests run the exact production code against
//! virtual time.

use std::{
    future::Future,
    time::{Duration, Instant},
};

/// Source of time for a runtime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Wait for `duration` to pass.
    ///
    /// Simulated environments advance their virtual clock instead of
    /// sleeping.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
