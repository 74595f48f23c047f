//! Telemetry values emitted by the service.

use std::time::Duration;

use crate::{hardlock::HardlockState, screenlock::ScreenlockState};

/// Why the user typed a password instead of unlocking by proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordAuthEvent {
    /// Hardlocked: no paired device.
    NoPairing,
    /// Hardlocked by the user.
    UserHardlock,
    /// Hardlocked: paired set changed.
    PairingChanged,
    /// Hardlocked: last attempt failed.
    LoginFailed,
    /// Hardlocked: device paired elsewhere.
    PairingAdded,
    /// No lock screen controller exists.
    NoScreenlockController,
    /// Controller exists but is inactive.
    ServiceNotActive,
    /// Local radio off.
    NoRadio,
    /// Still connecting.
    RadioConnecting,
    /// No companion found.
    NoRemoteDevice,
    /// Companion not authenticated.
    RemoteNotAuthenticated,
    /// Companion locked.
    RemoteLocked,
    /// Companion lacks a screen lock.
    RemoteNotLockable,
    /// Companion unsupported.
    RemoteUnsupported,
    /// Companion too far.
    SignalTooWeak,
    /// Companion too close.
    TransmitPowerTooHigh,
    /// Companion locked and too close.
    RemoteLockedAndTxTooHigh,
    /// Companion was ready, the user typed a password anyway.
    WithAuthenticatedRemote,
}

impl PasswordAuthEvent {
    /// Classify a password login from the hardlock overlay and the lock
    /// screen state (`None` when no controller exists).
    pub fn classify(hardlock: HardlockState, screen: Option<ScreenlockState>) -> Self {
        match hardlock {
            HardlockState::NoPairing => return Self::NoPairing,
            HardlockState::UserHardlock => return Self::UserHardlock,
            HardlockState::PairingChanged => return Self::PairingChanged,
            HardlockState::LoginFailed => return Self::LoginFailed,
            HardlockState::PairingAdded => return Self::PairingAdded,
            HardlockState::NoHardlock => {},
        }
        let Some(screen) = screen else {
            return Self::NoScreenlockController;
        };
        match screen {
            ScreenlockState::Inactive => Self::ServiceNotActive,
            ScreenlockState::NoRadio => Self::NoRadio,
            ScreenlockState::RadioConnecting => Self::RadioConnecting,
            ScreenlockState::NoRemoteDevice => Self::NoRemoteDevice,
            ScreenlockState::RemoteNotAuthenticated => Self::RemoteNotAuthenticated,
            ScreenlockState::RemoteLocked => Self::RemoteLocked,
            ScreenlockState::RemoteUnlockable => Self::RemoteNotLockable,
            ScreenlockState::RemoteUnsupported => Self::RemoteUnsupported,
            ScreenlockState::SignalTooWeak => Self::SignalTooWeak,
            ScreenlockState::TransmitPowerTooHigh => Self::TransmitPowerTooHigh,
            ScreenlockState::RemoteLockedAndTxTooHigh => Self::RemoteLockedAndTxTooHigh,
            ScreenlockState::Authenticated => Self::WithAuthenticatedRemote,
        }
    }
}

/// Trial run walkthrough events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrialRunEvent {
    /// The walkthrough started.
    Launched,
    /// The user clicked the lock icon during the walkthrough.
    ClickedLockIcon,
}

/// A telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// A password login happened while the feature was enabled.
    PasswordAuth(PasswordAuthEvent),
    /// Trial run progress.
    TrialRun(TrialRunEvent),
    /// Time from resume to an authenticated companion.
    StartupTimeFromSuspend(Duration),
    /// An unlock attempt failed.
    UnlockFailed,
    /// The screen was unlocked through the companion.
    ManualRemoteUnlock {
        /// The companion was seen locked during the lock session.
        saw_locked_remote: bool,
    },
}
