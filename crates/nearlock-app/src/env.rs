//! Production environment.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use nearlock_core::Environment;

/// Wall-clock environment backed by tokio's timer.
///
/// Time is read through tokio so paused-clock tests observe virtual time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
