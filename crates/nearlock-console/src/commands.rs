//! Command parsing for the console.
//!
//! This module parses input lines into structured [`Command`] values and maps
//! the ones that drive the service onto [`ServiceEvent`]s.

use std::time::Duration;

use nearlock_core::{
    DeviceId, RemoteDevice, ScreenlockState, ServiceEvent, UserId, attempt::wrap_secret,
};

/// Sign-in key length; typed keys are zero-padded or truncated to it.
const KEY_LEN: usize = 32;

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Radio adapter appeared or vanished.
    Radio {
        /// New presence.
        present: bool,
    },

    /// The system is about to suspend.
    Suspend,

    /// The system resumed.
    Resume {
        /// How long it slept.
        slept: Duration,
    },

    /// The screen locked.
    Lock,

    /// The screen unlocked.
    Unlock,

    /// The companion reported a lock screen state.
    State {
        /// Reported state.
        state: ScreenlockState,
    },

    /// Start an authentication attempt for the active user.
    Attempt,

    /// The companion answered an unlock attempt.
    FinalizeUnlock {
        /// Whether it succeeded.
        success: bool,
    },

    /// The companion answered a sign-in attempt.
    Signin {
        /// Unwrap key; empty means cancelled.
        key: Vec<u8>,
    },

    /// Load the sealed sign-in secret.
    Secret {
        /// Password to seal.
        secret: String,
        /// Sealing key, as typed.
        key: Vec<u8>,
    },

    /// Show the lock screen state for the active user.
    Initial,

    /// Start the first-run walkthrough.
    Trial,

    /// Turn proximity unlock off remotely.
    TurnOff,

    /// Forget the last turn-off outcome.
    TurnOffReset,

    /// Replace the locally paired devices.
    Pair {
        /// Device fingerprints.
        devices: Vec<String>,
    },

    /// Set what the trusted device registry answers.
    Trust {
        /// Device fingerprints, or `None` to make fetches fail.
        devices: Option<Vec<String>>,
    },

    /// Compare local pairing with the registry.
    Check,

    /// Switch the active user.
    User {
        /// New user, or `None` to clear.
        user: Option<String>,
    },

    /// Platform policy changed.
    Policy {
        /// Whether the feature is allowed.
        allowed: bool,
    },

    /// The user session started.
    Session,

    /// The user clicked the lock icon.
    Click,

    /// Print the status line.
    Status,

    /// Print the command list.
    Help,

    /// Quit the console.
    Quit,

    /// Blank line.
    Empty,

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// One line per command, for `/help`.
pub const HELP: &str = "\
/radio on|off          radio adapter presence
/suspend               system about to sleep
/resume [secs]         system resumed
/lock, /unlock         screen lock state
/state <state>         companion-reported lock screen state
/attempt               start an auth attempt for the active user
/finalize ok|fail      answer an unlock attempt
/signin [key]          answer a sign-in attempt (no key cancels)
/secret <pw> <key>     seal the sign-in password with key
/pair <psk>...         replace local paired devices
/trust <psk>...|fail   registry answer for fetches
/check                 compare pairing with the registry
/user [id]             switch or clear the active user
/policy on|off         platform policy
/session               user session started
/click                 lock icon clicked
/initial               show the user's initial lock screen state
/trial                 start the first-run walkthrough
/turnoff [reset]       turn the feature off remotely, or reset the flow
/status                show status
/quit                  exit";

/// Parse a user input line into a command.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Unknown { input: input.to_string() };
    };

    let parts: Vec<&str> = cmd_str.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");
    let args = parts.get(1..).unwrap_or_default();

    match command {
        "radio" => match on_off(args) {
            Some(present) => Command::Radio { present },
            None => invalid("radio", "Usage: /radio on|off"),
        },

        "suspend" => Command::Suspend,

        "resume" => match args.first().map(|secs| secs.parse::<u64>()) {
            None => Command::Resume { slept: Duration::ZERO },
            Some(Ok(secs)) => Command::Resume { slept: Duration::from_secs(secs) },
            Some(Err(_)) => invalid("resume", "Invalid duration"),
        },

        "lock" => Command::Lock,
        "unlock" => Command::Unlock,

        "state" => match args.first() {
            Some(name) => match parse_state(name) {
                Some(state) => Command::State { state },
                None => invalid("state", "Unknown state"),
            },
            None => invalid("state", "Usage: /state <state>"),
        },

        "attempt" => Command::Attempt,

        "finalize" => match args.first().copied() {
            Some("ok") => Command::FinalizeUnlock { success: true },
            Some("fail") => Command::FinalizeUnlock { success: false },
            _ => invalid("finalize", "Usage: /finalize ok|fail"),
        },

        "signin" => Command::Signin {
            key: args.first().map(|key| typed_key(key)).unwrap_or_default(),
        },

        "secret" => match args {
            [secret, key] => {
                Command::Secret { secret: (*secret).to_string(), key: typed_key(key) }
            },
            _ => invalid("secret", "Usage: /secret <password> <key>"),
        },

        "pair" => Command::Pair { devices: owned(args) },

        "trust" => match args {
            ["fail"] => Command::Trust { devices: None },
            _ => Command::Trust { devices: Some(owned(args)) },
        },

        "check" => Command::Check,

        "user" => Command::User { user: args.first().map(|user| (*user).to_string()) },

        "policy" => match on_off(args) {
            Some(allowed) => Command::Policy { allowed },
            None => invalid("policy", "Usage: /policy on|off"),
        },

        "session" => Command::Session,
        "click" => Command::Click,
        "initial" => Command::Initial,
        "trial" => Command::Trial,

        "turnoff" => match args.first().copied() {
            None => Command::TurnOff,
            Some("reset") => Command::TurnOffReset,
            Some(_) => invalid("turnoff", "Usage: /turnoff [reset]"),
        },
        "status" | "s" => Command::Status,
        "help" | "h" => Command::Help,
        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}

impl Command {
    /// Service event this command stands for, if any.
    ///
    /// [`Command::Attempt`] needs an active user and yields `None` without
    /// one. [`Command::Secret`] yields `None` if sealing fails.
    pub fn into_event(self, active_user: Option<&UserId>) -> Option<ServiceEvent> {
        let event = match self {
            Self::Radio { present } => ServiceEvent::RadioPresenceChanged { present },
            Self::Suspend => ServiceEvent::SuspendImminent,
            Self::Resume { slept } => ServiceEvent::SuspendDone { sleep_duration: slept },
            Self::Lock => ServiceEvent::ScreenDidLock,
            Self::Unlock => ServiceEvent::ScreenDidUnlock,
            Self::State { state } => ServiceEvent::ScreenlockStateRequested { state },
            Self::Attempt => ServiceEvent::AttemptAuth { user: active_user?.clone() },
            Self::FinalizeUnlock { success } => ServiceEvent::FinalizeUnlock { success },
            Self::Signin { key } => ServiceEvent::FinalizeSignin { key },
            Self::Secret { secret, key } => ServiceEvent::WrappedSecretChanged {
                wrapped_secret: wrap_secret(secret.as_bytes(), &key)?,
            },
            Self::Initial => ServiceEvent::ShowInitialUserState,
            Self::Trial => ServiceEvent::TrialRunRequested,
            Self::TurnOff => ServiceEvent::TurnOffRequested,
            Self::TurnOffReset => ServiceEvent::TurnOffReset,
            Self::Pair { devices } => ServiceEvent::RemoteDevicesChanged {
                devices: Some(devices.iter().map(|psk| remote_device(psk)).collect()),
            },
            Self::Check => ServiceEvent::CheckPairing,
            Self::User { user } => ServiceEvent::ActiveUserChanged { user: user.map(UserId::new) },
            Self::Policy { allowed } => ServiceEvent::PolicyChanged { allowed },
            Self::Session => ServiceEvent::SessionStarted,
            Self::Click => ServiceEvent::LockIconClicked,
            Self::Trust { .. }
            | Self::Status
            | Self::Help
            | Self::Quit
            | Self::Empty
            | Self::Unknown { .. }
            | Self::InvalidArgs { .. } => return None,
        };
        Some(event)
    }
}

/// Parse a kebab-case lock screen state name.
pub fn parse_state(name: &str) -> Option<ScreenlockState> {
    let state = match name {
        "inactive" => ScreenlockState::Inactive,
        "no-radio" => ScreenlockState::NoRadio,
        "connecting" => ScreenlockState::RadioConnecting,
        "no-remote" => ScreenlockState::NoRemoteDevice,
        "not-authenticated" => ScreenlockState::RemoteNotAuthenticated,
        "remote-locked" => ScreenlockState::RemoteLocked,
        "remote-unlockable" => ScreenlockState::RemoteUnlockable,
        "unsupported" => ScreenlockState::RemoteUnsupported,
        "too-weak" => ScreenlockState::SignalTooWeak,
        "too-close" => ScreenlockState::TransmitPowerTooHigh,
        "locked-too-close" => ScreenlockState::RemoteLockedAndTxTooHigh,
        "authenticated" => ScreenlockState::Authenticated,
        _ => return None,
    };
    Some(state)
}

fn typed_key(text: &str) -> Vec<u8> {
    let mut key = text.as_bytes().to_vec();
    key.resize(KEY_LEN, 0);
    key
}

fn remote_device(psk: &str) -> RemoteDevice {
    RemoteDevice {
        bluetooth_address: String::new(),
        public_key: psk.as_bytes().to_vec(),
        psk: DeviceId::new(psk),
    }
}

fn on_off(args: &[&str]) -> Option<bool> {
    match args.first().copied() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}

fn invalid(command: &str, error: &str) -> Command {
    Command::InvalidArgs { command: command.into(), error: error.into() }
}
