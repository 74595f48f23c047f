//! Preference storage.
//!
//! The service persists two dictionaries, both keyed by user id:
//!
//! - [`HARDLOCK_STATE_KEY`]: user id to integer hardlock bit value
//! - [`USER_PREFS_KEY`]: user id to a dictionary of per-user settings
//!
//! Backends are shared, clonable handles. A missing backend (`None`) is a
//! legitimate configuration during early startup and in tests: reads fall
//! back to defaults and writes are dropped.

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{error::StorageError, types::UserId};

/// Dictionary holding per-user hardlock bit values.
pub const HARDLOCK_STATE_KEY: &str = "nearlock.hardlock_state";

/// Dictionary holding per-user settings dictionaries.
pub const USER_PREFS_KEY: &str = "nearlock.user_prefs";

/// Entry inside a user's settings dictionary.
pub const PROXIMITY_REQUIRED_KEY: &str = "nearlock.proximity_required";

/// A stored preference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer, used for enum bit values.
    Int(i64),
    /// Nested dictionary.
    Dict(PrefDict),
}

impl PrefValue {
    /// The boolean payload, if this is a [`PrefValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer payload, if this is a [`PrefValue::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The dictionary payload, if this is a [`PrefValue::Dict`].
    pub fn as_dict(&self) -> Option<&PrefDict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

/// String-keyed dictionary of preference values.
pub type PrefDict = BTreeMap<String, PrefValue>;

/// Keyed dictionary storage shared between profiles.
///
/// Implementations must be cheap to clone; clones observe the same data.
pub trait PreferenceStore: Clone + Send + Sync + 'static {
    /// Read the dictionary stored under `key`.
    fn dict(&self, key: &str) -> Option<PrefDict>;

    /// Replace the dictionary stored under `key`.
    fn set_dict(&self, key: &str, dict: PrefDict) -> Result<(), StorageError>;

    /// Read-modify-write the dictionary under `key`, starting from an empty
    /// dictionary if none is stored.
    fn update_dict<F>(&self, key: &str, update: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut PrefDict),
    {
        let mut dict = self.dict(key).unwrap_or_default();
        update(&mut dict);
        self.set_dict(key, dict)
    }
}

/// In-memory preference store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    inner: Arc<RwLock<BTreeMap<String, PrefDict>>>,
}

impl MemoryPreferences {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn dict(&self, key: &str) -> Option<PrefDict> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(key).cloned()
    }

    fn set_dict(&self, key: &str, dict: PrefDict) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key.to_owned(), dict);
        Ok(())
    }
}

/// Per-user settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserSettings {
    /// Whether the companion must be very close before unlocking.
    pub require_close_proximity: bool,
}

impl UserSettings {
    /// Load the settings for `user`, defaulting when the backend or the
    /// entry is missing.
    pub fn load<P: PreferenceStore>(prefs: Option<&P>, user: &UserId) -> Self {
        let Some(prefs) = prefs else {
            return Self::default();
        };
        let require_close_proximity = prefs
            .dict(USER_PREFS_KEY)
            .as_ref()
            .and_then(|all| all.get(user.as_str()))
            .and_then(PrefValue::as_dict)
            .and_then(|entry| entry.get(PROXIMITY_REQUIRED_KEY))
            .and_then(PrefValue::as_bool)
            .unwrap_or(false);

        Self { require_close_proximity }
    }

    /// Mirror these settings into the shared store for `user`, so the
    /// sign-in screen can read them.
    pub fn store<P: PreferenceStore>(&self, prefs: &P, user: &UserId) -> Result<(), StorageError> {
        let mut entry = PrefDict::new();
        entry.insert(
            PROXIMITY_REQUIRED_KEY.to_owned(),
            PrefValue::Bool(self.require_close_proximity),
        );
        prefs.update_dict(USER_PREFS_KEY, |all| {
            all.insert(user.as_str().to_owned(), PrefValue::Dict(entry));
        })
    }
}
