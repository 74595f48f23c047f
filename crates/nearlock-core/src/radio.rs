//! Radio adapter presence monitor.
//!
//! Discovery is asynchronous: [`RadioAdapterMonitor::initialize`] tells the
//! owner to issue a discovery request, and the result comes back through
//! [`RadioAdapterMonitor::on_discovered`] or
//! [`RadioAdapterMonitor::on_unavailable`]. Until then the adapter counts as
//! absent.

use tracing::debug;

/// Discovery progress of the radio adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioState {
    /// Discovery has not been requested.
    #[default]
    Uninitialized,
    /// Discovery requested, no answer yet.
    Discovering,
    /// The platform has no adapter subsystem. Terminal until reset.
    Unavailable,
    /// Discovery completed.
    Discovered {
        /// Whether the adapter is currently present.
        present: bool,
    },
}

/// Tracks radio adapter presence
#[derive(Debug, Clone, Default)]
pub struct RadioAdapterMonitor {
    state: RadioState,
}

impl RadioAdapterMonitor {
    /// Create an uninitialized monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current discovery state.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Begin discovery. Returns `true` when the caller must issue the
    /// discovery request; repeated calls return `false`.
    pub fn initialize(&mut self) -> bool {
        if self.state != RadioState::Uninitialized {
            return false;
        }
        self.state = RadioState::Discovering;
        true
    }

    /// Discovery completed. Always asks the owner to re-evaluate, even if
    /// the adapter turned out to be absent.
    pub fn on_discovered(&mut self, present: bool) -> bool {
        if self.state != RadioState::Discovering {
            debug!(state = ?self.state, "ignoring radio discovery reply");
            return false;
        }
        self.state = RadioState::Discovered { present };
        true
    }

    /// The platform reported that no adapter subsystem exists. Only a
    /// pending discovery can end this way; returns `false` otherwise.
    pub fn on_unavailable(&mut self) -> bool {
        if self.state != RadioState::Discovering {
            debug!(state = ?self.state, "ignoring radio unavailable reply");
            return false;
        }
        debug!("radio adapter subsystem unavailable");
        self.state = RadioState::Unavailable;
        true
    }

    /// Adapter presence changed. Returns `true` only for an actual change.
    pub fn on_present_changed(&mut self, present: bool) -> bool {
        match self.state {
            RadioState::Discovered { present: old } if old != present => {
                self.state = RadioState::Discovered { present };
                true
            },
            RadioState::Discovered { .. } => false,
            state => {
                debug!(?state, present, "presence change before discovery, ignored");
                false
            },
        }
    }

    /// Whether the adapter is known to be present.
    pub fn is_present(&self) -> bool {
        matches!(self.state, RadioState::Discovered { present: true })
    }

    /// Return to the uninitialized state.
    pub fn reset(&mut self) {
        self.state = RadioState::Uninitialized;
    }
}
