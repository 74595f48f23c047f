//! Service observers.

use std::fmt;

/// Derived state of the companion app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Loaded and enabled.
    Loaded,
    /// Disabled.
    Disabled,
}

/// Progress of the remote turn-off flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnOffFlowStatus {
    /// No turn-off running.
    #[default]
    Idle,
    /// Waiting for the remote to confirm.
    Pending,
    /// The remote refused or could not be reached.
    Failed,
}

/// Receives service notifications.
///
/// No ordering between observers is guaranteed.
pub trait ServiceObserver: Send {
    /// The companion app was loaded or disabled.
    fn on_app_state_changed(&mut self, _state: AppState) {}

    /// The turn-off flow changed status.
    fn on_turn_off_operation_status_changed(&mut self, _status: TurnOffFlowStatus) {}
}

/// Handle returned by [`crate::UnlockService::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn ServiceObserver>)>,
}

impl ObserverList {
    pub(crate) fn add(&mut self, observer: Box<dyn ServiceObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub(crate) fn notify_app_state(&mut self, state: AppState) {
        for (_, observer) in &mut self.observers {
            observer.on_app_state_changed(state);
        }
    }

    pub(crate) fn notify_turn_off_status(&mut self, status: TurnOffFlowStatus) {
        for (_, observer) in &mut self.observers {
            observer.on_turn_off_operation_status_changed(status);
        }
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList").field("len", &self.observers.len()).finish()
    }
}
