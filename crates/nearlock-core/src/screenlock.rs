//! Lock screen presentation.
//!
//! [`ScreenlockStateController`] combines the companion-reported
//! [`ScreenlockState`] with the user's [`HardlockState`] and decides what the
//! lock screen shows: which icon, which tooltip, and whether the pod offers
//! click-to-unlock. It never talks to the UI directly; every operation
//! returns the [`LockScreenCommand`]s for the UI bridge to apply.

use tracing::debug;

use crate::{hardlock::HardlockState, types::UserId};

/// State of the companion as seen by the lock screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScreenlockState {
    /// Proximity unlock is not running for this user.
    #[default]
    Inactive,
    /// The local radio adapter is off or missing.
    NoRadio,
    /// Looking for the companion.
    RadioConnecting,
    /// No companion device is paired.
    NoRemoteDevice,
    /// The companion failed to authenticate.
    RemoteNotAuthenticated,
    /// The companion is locked.
    RemoteLocked,
    /// The companion has no screen lock of its own.
    RemoteUnlockable,
    /// The companion does not support proximity unlock.
    RemoteUnsupported,
    /// The companion is too far away.
    SignalTooWeak,
    /// The companion is too close.
    TransmitPowerTooHigh,
    /// The companion is locked and too close.
    RemoteLockedAndTxTooHigh,
    /// The companion is authenticated; the user may click to unlock.
    Authenticated,
}

impl ScreenlockState {
    /// States that leave an in-flight attempt valid when remote auth fails.
    ///
    /// Entering any other non-authenticated state while an attempt is in
    /// flight discards the attempt and raises a login failure.
    pub const fn is_valid_on_remote_auth_failure(self) -> bool {
        matches!(
            self,
            Self::NoRadio | Self::RadioConnecting | Self::NoRemoteDevice | Self::RemoteLocked
        )
    }

    /// Icon for this state. `None` hides the icon.
    pub const fn icon(self) -> Option<LockIcon> {
        match self {
            Self::Inactive => None,
            Self::NoRadio
            | Self::NoRemoteDevice
            | Self::RemoteNotAuthenticated
            | Self::RemoteUnsupported => Some(LockIcon::Locked),
            Self::RemoteLocked
            | Self::RemoteUnlockable
            | Self::SignalTooWeak
            | Self::TransmitPowerTooHigh
            | Self::RemoteLockedAndTxTooHigh => Some(LockIcon::LockedToBeActivated),
            Self::RadioConnecting => Some(LockIcon::Spinner),
            Self::Authenticated => Some(LockIcon::Unlocked),
        }
    }

    /// Tooltip for this state, if any.
    pub const fn tooltip(self) -> Option<Tooltip> {
        match self {
            Self::Inactive | Self::RadioConnecting => None,
            Self::NoRadio => Some(Tooltip::TurnOnRadio),
            Self::NoRemoteDevice => Some(Tooltip::NoRemote),
            Self::RemoteNotAuthenticated => Some(Tooltip::RemoteNotAuthenticated),
            Self::RemoteLocked => Some(Tooltip::UnlockRemote),
            Self::RemoteUnlockable => Some(Tooltip::SetUpRemoteLock),
            Self::RemoteUnsupported => Some(Tooltip::RemoteUnsupported),
            Self::SignalTooWeak => Some(Tooltip::RemoteTooFar),
            Self::TransmitPowerTooHigh => Some(Tooltip::RemoteTooClose),
            Self::RemoteLockedAndTxTooHigh => Some(Tooltip::UnlockRemoteAndMoveAway),
            Self::Authenticated => Some(Tooltip::ClickToUnlock),
        }
    }
}

/// Icon shown on the user pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockIcon {
    /// Closed padlock.
    Locked,
    /// Closed padlock that will open once the companion is ready.
    LockedToBeActivated,
    /// Open padlock.
    Unlocked,
    /// Connecting spinner.
    Spinner,
    /// Hardlocked padlock.
    Hardlocked,
}

/// Tooltip message attached to the pod icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tooltip {
    /// Click the icon to unlock.
    ClickToUnlock,
    /// First-run walkthrough variant of [`Tooltip::ClickToUnlock`].
    TrialRun,
    /// Turn on the local radio.
    TurnOnRadio,
    /// No companion in range.
    NoRemote,
    /// The companion could not be verified.
    RemoteNotAuthenticated,
    /// Unlock the companion.
    UnlockRemote,
    /// Set up a screen lock on the companion.
    SetUpRemoteLock,
    /// The companion is not supported.
    RemoteUnsupported,
    /// Bring the companion closer.
    RemoteTooFar,
    /// Move the companion further away.
    RemoteTooClose,
    /// Unlock the companion and move it away.
    UnlockRemoteAndMoveAway,
    /// The user turned proximity unlock off from the lock screen.
    UserHardlock,
    /// The paired device set changed.
    PairingChanged,
    /// A device was paired on another machine.
    PairingAdded,
    /// The last attempt failed; use the password.
    LoginFailed,
}

impl Tooltip {
    /// Tooltip shown with the hardlock UI for `state`.
    pub const fn for_hardlock(state: HardlockState) -> Option<Self> {
        match state {
            HardlockState::NoHardlock | HardlockState::NoPairing => None,
            HardlockState::UserHardlock => Some(Self::UserHardlock),
            HardlockState::PairingChanged => Some(Self::PairingChanged),
            HardlockState::PairingAdded => Some(Self::PairingAdded),
            HardlockState::LoginFailed => Some(Self::LoginFailed),
        }
    }
}

/// How the lock screen authenticates the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthType {
    /// Password entry.
    #[default]
    OfflinePassword,
    /// Click on the pod to unlock through the companion.
    UserClick,
}

/// Commands for the lock screen UI bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScreenCommand {
    /// Show the pod icon.
    ShowIcon {
        /// Pod owner.
        user: UserId,
        /// Icon to show.
        icon: LockIcon,
        /// Tooltip, if any.
        tooltip: Option<Tooltip>,
        /// Clicking the icon hardlocks the user.
        hardlock_on_click: bool,
    },
    /// Hide the pod icon.
    HideIcon {
        /// Pod owner.
        user: UserId,
    },
    /// Switch the pod's authentication type.
    SetAuthType {
        /// Pod owner.
        user: UserId,
        /// New authentication type.
        auth_type: AuthType,
    },
    /// Re-enable password input after an abandoned attempt.
    EnableInput,
    /// Unlock the screen for the user.
    Unlock {
        /// User to unlock.
        user: UserId,
    },
    /// Sign the user in with the unwrapped secret.
    AttemptSignin {
        /// User to sign in.
        user: UserId,
        /// Sealed secret as stored.
        wrapped_secret: Vec<u8>,
        /// Unsealed secret.
        secret: Vec<u8>,
    },
}

/// What the lock screen currently shows for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    /// Icon, or `None` when hidden.
    pub icon: Option<LockIcon>,
    /// Tooltip, if any.
    pub tooltip: Option<Tooltip>,
    /// Authentication type offered.
    pub auth_type: AuthType,
}

/// Lock screen state machine for one user
#[derive(Debug, Clone)]
pub struct ScreenlockStateController {
    user: UserId,
    state: ScreenlockState,
    hardlock_state: HardlockState,
    hardlock_ui_shown: bool,
    trial_run: bool,
    screen_locked: bool,
    auth_type: AuthType,
    did_see_locked_remote: bool,
    presentation: Presentation,
}

impl ScreenlockStateController {
    /// Create a controller for `user` starting from a persisted hardlock.
    pub fn new(user: UserId, hardlock_state: HardlockState, screen_locked: bool) -> Self {
        Self {
            user,
            state: ScreenlockState::Inactive,
            hardlock_state,
            hardlock_ui_shown: false,
            trial_run: false,
            screen_locked,
            auth_type: AuthType::OfflinePassword,
            did_see_locked_remote: false,
            presentation: Presentation {
                icon: None,
                tooltip: None,
                auth_type: AuthType::OfflinePassword,
            },
        }
    }

    /// User this controller renders for.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Current companion state.
    pub fn state(&self) -> ScreenlockState {
        self.state
    }

    /// Current hardlock overlay.
    pub fn hardlock_state(&self) -> HardlockState {
        self.hardlock_state
    }

    /// Authentication type offered by the pod.
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Whether a first-run walkthrough is active.
    pub fn is_trial_run(&self) -> bool {
        self.trial_run
    }

    /// Whether the controller is in a non-inactive state.
    pub fn is_active(&self) -> bool {
        self.state != ScreenlockState::Inactive
    }

    /// Whether an in-flight attempt survives the current state.
    pub fn in_state_valid_on_remote_auth_failure(&self) -> bool {
        self.state.is_valid_on_remote_auth_failure()
    }

    /// What the lock screen last rendered.
    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    /// Transition to `new_state`. Identical states are a no-op.
    pub fn change_state(&mut self, new_state: ScreenlockState) -> Vec<LockScreenCommand> {
        if self.state == new_state {
            return Vec::new();
        }
        debug!(user = %self.user, from = ?self.state, to = ?new_state, "screenlock state");
        self.state = new_state;
        if new_state == ScreenlockState::RemoteLocked {
            self.did_see_locked_remote = true;
        }
        self.render()
    }

    /// Apply a hardlock overlay.
    ///
    /// A login failure never replaces another hardlock. Clearing the
    /// hardlock does not re-render; the screen is about to unlock.
    pub fn set_hardlock_state(&mut self, new_state: HardlockState) -> Vec<LockScreenCommand> {
        if self.hardlock_state == new_state {
            return Vec::new();
        }
        if new_state == HardlockState::LoginFailed && self.hardlock_state.is_hardlocked() {
            return Vec::new();
        }
        self.hardlock_state = new_state;
        if !new_state.is_hardlocked() {
            return Vec::new();
        }
        self.hardlock_ui_shown = false;
        self.render()
    }

    /// Show the hardlock UI right away if a hardlock is set.
    pub fn maybe_show_hardlock_ui(&mut self) -> Vec<LockScreenCommand> {
        if !self.hardlock_state.is_hardlocked() || !self.screen_locked {
            return Vec::new();
        }
        self.show_hardlock_ui()
    }

    /// Start the first-run walkthrough. Returns `None` if one is running.
    pub fn set_trial_run(&mut self) -> Option<Vec<LockScreenCommand>> {
        if self.trial_run {
            return None;
        }
        self.trial_run = true;
        Some(self.render())
    }

    /// Whether a lock icon click counts as a trial run interaction.
    pub fn record_click_on_lock_icon(&self) -> bool {
        self.trial_run
    }

    /// The screen got locked.
    pub fn screen_did_lock(&mut self) -> Vec<LockScreenCommand> {
        self.screen_locked = true;
        self.did_see_locked_remote = self.state == ScreenlockState::RemoteLocked;
        self.hardlock_ui_shown = false;
        self.render()
    }

    /// The screen got unlocked.
    ///
    /// Clears a login failure and ends the trial run. Returns whether the
    /// remote was seen locked during this lock session, when the unlock went
    /// through the companion.
    pub fn screen_did_unlock(&mut self) -> Option<bool> {
        self.screen_locked = false;
        if self.hardlock_state == HardlockState::LoginFailed {
            self.hardlock_state = HardlockState::NoHardlock;
        }
        self.hardlock_ui_shown = false;
        self.trial_run = false;

        let saw_locked_remote = self.did_see_locked_remote;
        self.did_see_locked_remote = false;
        (self.state == ScreenlockState::Authenticated).then_some(saw_locked_remote)
    }

    /// Remove everything this controller put on the lock screen.
    pub fn teardown(self) -> Vec<LockScreenCommand> {
        if !self.screen_locked || self.presentation.icon.is_none() {
            return Vec::new();
        }
        vec![
            LockScreenCommand::HideIcon { user: self.user.clone() },
            LockScreenCommand::SetAuthType {
                user: self.user,
                auth_type: AuthType::OfflinePassword,
            },
        ]
    }

    fn render(&mut self) -> Vec<LockScreenCommand> {
        if !self.screen_locked {
            return Vec::new();
        }
        if self.hardlock_state.is_hardlocked() && !self.trial_run {
            return self.show_hardlock_ui();
        }

        let mut commands = Vec::new();
        let auth_type = if self.state == ScreenlockState::Authenticated {
            AuthType::UserClick
        } else {
            AuthType::OfflinePassword
        };
        self.push_auth_type(auth_type, &mut commands);

        match self.state.icon() {
            None => self.push_hide(&mut commands),
            Some(icon) => {
                let tooltip = if self.trial_run && self.state == ScreenlockState::Authenticated {
                    Some(Tooltip::TrialRun)
                } else {
                    self.state.tooltip()
                };
                let hardlock_on_click =
                    !self.trial_run && self.state != ScreenlockState::Authenticated;
                self.push_show(icon, tooltip, hardlock_on_click, &mut commands);
            },
        }
        commands
    }

    fn show_hardlock_ui(&mut self) -> Vec<LockScreenCommand> {
        let mut commands = Vec::new();
        self.push_auth_type(AuthType::OfflinePassword, &mut commands);

        if self.hardlock_state == HardlockState::NoPairing {
            self.push_hide(&mut commands);
            self.hardlock_ui_shown = false;
            return commands;
        }
        if self.hardlock_ui_shown {
            return commands;
        }

        let icon = if self.hardlock_state == HardlockState::LoginFailed {
            LockIcon::Locked
        } else {
            LockIcon::Hardlocked
        };
        self.push_show(icon, Tooltip::for_hardlock(self.hardlock_state), false, &mut commands);
        self.hardlock_ui_shown = true;
        commands
    }

    fn push_auth_type(&mut self, auth_type: AuthType, commands: &mut Vec<LockScreenCommand>) {
        if self.auth_type == auth_type {
            return;
        }
        self.auth_type = auth_type;
        self.presentation.auth_type = auth_type;
        commands.push(LockScreenCommand::SetAuthType { user: self.user.clone(), auth_type });
    }

    fn push_show(
        &mut self,
        icon: LockIcon,
        tooltip: Option<Tooltip>,
        hardlock_on_click: bool,
        commands: &mut Vec<LockScreenCommand>,
    ) {
        self.presentation.icon = Some(icon);
        self.presentation.tooltip = tooltip;
        commands.push(LockScreenCommand::ShowIcon {
            user: self.user.clone(),
            icon,
            tooltip,
            hardlock_on_click,
        });
    }

    fn push_hide(&mut self, commands: &mut Vec<LockScreenCommand>) {
        self.presentation.icon = None;
        self.presentation.tooltip = None;
        commands.push(LockScreenCommand::HideIcon { user: self.user.clone() });
    }
}
