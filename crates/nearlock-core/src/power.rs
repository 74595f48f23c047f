//! Suspend/resume tracking.
//!
//! The radio disappears while the system sleeps and takes a moment to come
//! back after resume. During the wake grace window following a resume, radio
//! absence is treated as transient so the companion app is not torn down and
//! reloaded on every lid open.

use std::time::{Duration, Instant};

use tracing::debug;

/// Tracks the post-resume grace window and wake-to-authenticated latency
#[derive(Debug, Clone)]
pub struct PowerStateMonitor {
    wake_grace: Duration,
    grace_deadline: Option<Instant>,
    wake_up_time: Option<Instant>,
    suspended: bool,
}

impl PowerStateMonitor {
    /// Create a monitor with the given grace window length.
    pub fn new(wake_grace: Duration) -> Self {
        Self { wake_grace, grace_deadline: None, wake_up_time: None, suspended: false }
    }

    /// The system is about to sleep.
    pub fn on_suspend_imminent(&mut self) {
        self.suspended = true;
    }

    /// The system resumed after sleeping for `sleep_duration`.
    ///
    /// Opens the grace window and returns its deadline, at which the owner
    /// must call [`PowerStateMonitor::tick`].
    pub fn on_suspend_done(&mut self, now: Instant, sleep_duration: Duration) -> Instant {
        debug!(?sleep_duration, "system resumed");
        self.suspended = false;
        let deadline = now + self.wake_grace;
        self.grace_deadline = Some(deadline);
        self.wake_up_time = Some(now);
        deadline
    }

    /// Whether the system is between suspend and resume.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether `now` falls inside the grace window.
    pub fn is_waking_up(&self, now: Instant) -> bool {
        self.grace_deadline.is_some_and(|deadline| now < deadline)
    }

    /// Deadline of the open grace window, if any.
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    /// Close the grace window once its deadline passed. Returns `true` when
    /// the window closed on this call.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.grace_deadline {
            Some(deadline) if now >= deadline => {
                self.grace_deadline = None;
                true
            },
            _ => false,
        }
    }

    /// Latency from the last resume to `now`. Yields a value at most once
    /// per resume.
    pub fn record_startup_time(&mut self, now: Instant) -> Option<Duration> {
        self.wake_up_time.take().map(|woke| now.saturating_duration_since(woke))
    }

    /// Close the grace window.
    pub fn reset(&mut self) {
        self.grace_deadline = None;
        self.wake_up_time = None;
        self.suspended = false;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn grace_window_lifecycle() {
        let t0 = Instant::now();
        let mut power = PowerStateMonitor::new(Duration::from_secs(5));

        power.on_suspend_imminent();
        assert!(power.is_suspended());
        assert!(!power.is_waking_up(t0));

        let t1 = t0 + Duration::from_secs(2);
        let deadline = power.on_suspend_done(t1, Duration::from_secs(2));
        assert_eq!(deadline, t1 + Duration::from_secs(5));
        assert!(!power.is_suspended());
        assert!(power.is_waking_up(t1 + Duration::from_secs(4)));

        assert!(!power.tick(t1 + Duration::from_secs(4)));
        assert!(power.tick(deadline));
        assert!(!power.tick(deadline));
        assert!(!power.is_waking_up(deadline));
    }

    #[test]
    fn startup_time_recorded_once() {
        let t0 = Instant::now();
        let mut power = PowerStateMonitor::new(Duration::from_secs(5));
        power.on_suspend_done(t0, Duration::from_secs(60));

        let t1 = t0 + Duration::from_millis(1500);
        assert_eq!(power.record_startup_time(t1), Some(Duration::from_millis(1500)));
        assert_eq!(power.record_startup_time(t1), None);
    }

    #[test]
    fn reset_clears_window() {
        let t0 = Instant::now();
        let mut power = PowerStateMonitor::new(Duration::from_secs(5));
        power.on_suspend_done(t0, Duration::ZERO);
        power.reset();

        assert!(!power.is_waking_up(t0));
        assert_eq!(power.record_startup_time(t0), None);
    }

    proptest! {
        #[test]
        fn window_matches_deadline(grace_ms in 1u64..10_000, at_ms in 0u64..20_000) {
            let t0 = Instant::now();
            let mut power = PowerStateMonitor::new(Duration::from_millis(grace_ms));
            power.on_suspend_done(t0, Duration::ZERO);

            let at = t0 + Duration::from_millis(at_ms);
            prop_assert_eq!(power.is_waking_up(at), at_ms < grace_ms);
        }
    }
}
