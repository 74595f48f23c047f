//! Persisted per-user hardlock state.
//!
//! A hardlock is a security override: once a user is in any state other than
//! [`HardlockState::NoHardlock`], proximity unlock stays disabled until the
//! service explicitly clears it.

use tracing::{debug, warn};

use crate::{
    prefs::{HARDLOCK_STATE_KEY, PrefValue, PreferenceStore},
    types::UserId,
};

/// Hardlock state of a user.
///
/// Persisted as an integer bit value; see [`HardlockState::to_bits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HardlockState {
    /// Proximity unlock is not blocked.
    #[default]
    NoHardlock,
    /// The user locked the feature by clicking the lock icon.
    UserHardlock,
    /// The trusted device set changed since pairing.
    PairingChanged,
    /// The user has no paired device, or the registry could not confirm one.
    NoPairing,
    /// An unlock attempt with the companion failed.
    LoginFailed,
    /// A device was paired while none was known locally.
    PairingAdded,
}

impl HardlockState {
    /// Stored integer encoding.
    pub const fn to_bits(self) -> i64 {
        match self {
            Self::NoHardlock => 0,
            Self::UserHardlock => 1,
            Self::PairingChanged => 2,
            Self::NoPairing => 4,
            Self::LoginFailed => 8,
            Self::PairingAdded => 16,
        }
    }

    /// Decode a stored integer. Unknown values yield `None`.
    pub const fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            0 => Some(Self::NoHardlock),
            1 => Some(Self::UserHardlock),
            2 => Some(Self::PairingChanged),
            4 => Some(Self::NoPairing),
            8 => Some(Self::LoginFailed),
            16 => Some(Self::PairingAdded),
            _ => None,
        }
    }

    /// Whether this state blocks proximity unlock.
    pub const fn is_hardlocked(self) -> bool {
        !matches!(self, Self::NoHardlock)
    }

    /// Pairing drift states are sticky: drift checks never downgrade them.
    pub const fn is_pairing_drift(self) -> bool {
        matches!(self, Self::PairingChanged | Self::PairingAdded)
    }
}

/// Hardlock persistence over an optional preference backend.
#[derive(Debug, Clone)]
pub struct HardlockStore<P> {
    prefs: Option<P>,
}

impl<P: PreferenceStore> HardlockStore<P> {
    /// Wrap a backend. `None` degrades reads to defaults and writes to no-ops.
    pub fn new(prefs: Option<P>) -> Self {
        Self { prefs }
    }

    /// The backing store, if any.
    pub fn prefs(&self) -> Option<&P> {
        self.prefs.as_ref()
    }

    /// Stored state for `user`, or `None` when absent or unreadable.
    pub fn get_persisted(&self, user: &UserId) -> Option<HardlockState> {
        let dict = self.prefs.as_ref()?.dict(HARDLOCK_STATE_KEY)?;
        let bits = dict.get(user.as_str()).and_then(PrefValue::as_int)?;
        let state = HardlockState::from_bits(bits);
        if state.is_none() {
            warn!(%user, bits, "ignoring unknown persisted hardlock value");
        }
        state
    }

    /// Stored state for `user`, defaulting to [`HardlockState::NoHardlock`].
    pub fn get(&self, user: &UserId) -> HardlockState {
        self.get_persisted(user).unwrap_or_default()
    }

    /// Overwrite the stored state for `user`.
    pub fn set(&self, user: &UserId, state: HardlockState) {
        let Some(prefs) = &self.prefs else {
            debug!(%user, ?state, "no preference backend, hardlock not persisted");
            return;
        };
        let result = prefs.update_dict(HARDLOCK_STATE_KEY, |dict| {
            dict.insert(user.as_str().to_owned(), PrefValue::Int(state.to_bits()));
        });
        if let Err(error) = result {
            warn!(%user, ?state, %error, "failed to persist hardlock state");
        }
    }

    /// Remove the stored entry for `user`.
    pub fn reset(&self, user: &UserId) {
        let Some(prefs) = &self.prefs else {
            return;
        };
        let result = prefs.update_dict(HARDLOCK_STATE_KEY, |dict| {
            dict.remove(user.as_str());
        });
        if let Err(error) = result {
            warn!(%user, %error, "failed to clear hardlock state");
        }
    }
}
