//! Events fed into the service.

use std::time::Duration;

use crate::{
    pairing::{FetchFailed, PairedDeviceSet, RemoteDevice},
    screenlock::ScreenlockState,
    types::{RequestId, UserId},
};

/// Inputs to [`crate::UnlockService::handle`].
///
/// Hardware signals, collaborator completions and user interactions all
/// arrive here. Completions carry the [`RequestId`] of the action that
/// started them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The companion app manager is ready.
    AppManagerReady,
    /// Radio discovery finished.
    RadioAdapterDiscovered {
        /// Whether an adapter is present.
        present: bool,
    },
    /// The platform has no radio adapter subsystem.
    RadioAdapterUnavailable,
    /// Radio adapter presence changed.
    RadioPresenceChanged {
        /// New presence.
        present: bool,
    },
    /// The system is about to suspend.
    SuspendImminent,
    /// The system resumed.
    SuspendDone {
        /// How long the system slept.
        sleep_duration: Duration,
    },
    /// A scheduled wakeup fired.
    Tick,
    /// The user session finished starting.
    SessionStarted,
    /// The platform allow policy changed.
    PolicyChanged {
        /// New verdict.
        allowed: bool,
    },
    /// The active user changed.
    ActiveUserChanged {
        /// New user, or `None` when nobody is focused.
        user: Option<UserId>,
    },
    /// The local remote device list changed.
    RemoteDevicesChanged {
        /// New list; `None` when unknown.
        devices: Option<Vec<RemoteDevice>>,
    },
    /// Compare local pairing against the registry.
    CheckPairing,
    /// Trusted device fetch finished.
    TrustedDevicesFetched {
        /// Request identity.
        request: RequestId,
        /// Registry answer.
        result: Result<PairedDeviceSet, FetchFailed>,
    },
    /// Key preparation finished.
    KeyPrepared {
        /// Request identity.
        request: RequestId,
    },
    /// Remote turn-off finished.
    TurnOffCompleted {
        /// Request identity.
        request: RequestId,
        /// Whether the remote accepted.
        success: bool,
    },
    /// The screen locked.
    ScreenDidLock,
    /// The screen unlocked.
    ScreenDidUnlock,
    /// The companion app reported a new lock screen state.
    ScreenlockStateRequested {
        /// Reported state.
        state: ScreenlockState,
    },
    /// The user clicked the pod to authenticate.
    AttemptAuth {
        /// User who clicked.
        user: UserId,
    },
    /// The companion answered an unlock attempt.
    FinalizeUnlock {
        /// Whether it succeeded.
        success: bool,
    },
    /// The companion answered a sign-in attempt.
    FinalizeSignin {
        /// Key unwrapping the stored secret; empty on cancellation.
        key: Vec<u8>,
    },
    /// The user clicked the lock icon.
    LockIconClicked,
    /// The sealed sign-in secret of the active user was loaded.
    WrappedSecretChanged {
        /// Secret sealed with the key the companion will hand back.
        wrapped_secret: Vec<u8>,
    },
    /// Show the lock screen state for the freshly focused user.
    ShowInitialUserState,
    /// Start the first-run walkthrough.
    TrialRunRequested,
    /// Ask the companion to turn proximity unlock off remotely.
    TurnOffRequested,
    /// Forget the outcome of the last turn-off request.
    TurnOffReset,
    /// Stop the service.
    Shutdown,
}
