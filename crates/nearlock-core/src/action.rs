//! Actions returned by the service for a runtime to execute.

use std::time::Instant;

use crate::{
    metrics::Metric,
    screenlock::LockScreenCommand,
    types::{RequestId, UserId},
};

/// Side effects requested by [`crate::UnlockService`].
///
/// Actions tagged with a [`RequestId`] expect a matching completion event;
/// the rest are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    /// Ask the companion app manager to become ready. Completes with
    /// [`crate::ServiceEvent::AppManagerReady`].
    EnsureAppReady,
    /// Load and enable the companion app.
    LoadApp,
    /// Disable the companion app if it is loaded.
    DisableAppIfLoaded,
    /// Reload the companion app.
    ReloadApp,
    /// Open the setup flow.
    LaunchSetup,
    /// Tell the companion app about the user.
    SendUserUpdated {
        /// Active user.
        user: UserId,
        /// Whether a session is signed in.
        logged_in: bool,
        /// Whether the user's pairing data is available.
        data_ready: bool,
    },
    /// Tell the companion app an auth attempt started.
    NotifyAuthAttempt {
        /// User being authenticated.
        user: UserId,
    },
    /// Start radio adapter discovery. Completes with
    /// [`crate::ServiceEvent::RadioAdapterDiscovered`] or
    /// [`crate::ServiceEvent::RadioAdapterUnavailable`].
    DiscoverRadioAdapter,
    /// Prepare secure key material. Completes with
    /// [`crate::ServiceEvent::KeyPrepared`].
    PrepareKey {
        /// Request identity.
        request: RequestId,
        /// Verify the private key as well.
        check_private_key: bool,
    },
    /// Fetch the registry's trusted devices. Completes with
    /// [`crate::ServiceEvent::TrustedDevicesFetched`].
    FetchTrustedDevices {
        /// Request identity.
        request: RequestId,
        /// User whose devices to fetch.
        user: UserId,
    },
    /// Deliver [`crate::ServiceEvent::Tick`] at `deadline`.
    ScheduleWakeup {
        /// When to tick.
        deadline: Instant,
    },
    /// Turn proximity unlock off remotely. Completes with
    /// [`crate::ServiceEvent::TurnOffCompleted`].
    RequestTurnOff {
        /// Request identity.
        request: RequestId,
    },
    /// Lock screen UI update.
    LockScreen(LockScreenCommand),
    /// Telemetry sample.
    RecordMetric(Metric),
}
