//! Unlock authorization service.
//!
//! [`UnlockService`] owns every piece of proximity unlock state for one
//! profile: the radio and power monitors, the lock screen controller, the
//! in-flight attempt and the pending asynchronous requests. It is driven by
//! [`UnlockService::handle`] and answers each input with the
//! [`ServiceAction`]s the runtime must execute.
//!
//! # Reconciliation
//!
//! After every relevant signal the service re-runs
//! [`UnlockService::update_app_state`]. When the feature is allowed the
//! companion app is loaded; when it is not, the app is disabled and all lock
//! screen state is dropped, except right after a resume when a missing radio
//! is expected to come back shortly.
//!
//! # Stale replies
//!
//! Asynchronous work is tagged with a [`RequestId`]. Replies whose id is not
//! pending anymore (user switch, shutdown, superseded request) are dropped.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    action::ServiceAction,
    attempt::{AttemptContext, AttemptKind, AuthAttempt},
    config::{ServiceConfig, ServiceKind},
    event::ServiceEvent,
    hardlock::{HardlockState, HardlockStore},
    metrics::{Metric, PasswordAuthEvent, TrialRunEvent},
    observer::{AppState, ObserverId, ObserverList, ServiceObserver, TurnOffFlowStatus},
    pairing::{FetchFailed, PairedDeviceSet, RemoteDevice, drift_hardlock, paired_device_set},
    power::PowerStateMonitor,
    prefs::{PreferenceStore, UserSettings},
    radio::{RadioAdapterMonitor, RadioState},
    screenlock::{AuthType, LockScreenCommand, ScreenlockState, ScreenlockStateController},
    types::{RequestId, UserId},
};

#[derive(Debug)]
struct PendingFetch {
    user: UserId,
    paired: PairedDeviceSet,
}

/// Point-in-time summary of the service, for frontends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Focused user.
    pub active_user: Option<UserId>,
    /// Whether proximity unlock may run.
    pub allowed: bool,
    /// Whether the active user has a paired device.
    pub enabled: bool,
    /// Whether the companion app is loaded.
    pub app_loaded: bool,
    /// Radio discovery state.
    pub radio: RadioState,
    /// Whether the screen is locked.
    pub screen_locked: bool,
    /// Persisted hardlock state of the active user.
    pub hardlock: HardlockState,
    /// Lock screen state, when a controller exists.
    pub screenlock: Option<ScreenlockState>,
    /// Turn-off flow status.
    pub turn_off: TurnOffFlowStatus,
}

/// Proximity unlock orchestrator for one profile
#[derive(Debug)]
pub struct UnlockService<P> {
    config: ServiceConfig,
    hardlock: HardlockStore<P>,

    active_user: Option<UserId>,
    remote_devices: Option<Vec<RemoteDevice>>,
    wrapped_secret: Vec<u8>,

    radio: RadioAdapterMonitor,
    power: PowerStateMonitor,
    screenlock: Option<ScreenlockStateController>,
    attempt: Option<AuthAttempt>,
    observers: ObserverList,

    policy_allowed: bool,
    session_started: bool,
    screen_locked: bool,
    app_manager_ready: bool,
    app_loaded: bool,
    key_checked: bool,
    shut_down: bool,

    next_request: u64,
    pending_fetches: HashMap<RequestId, PendingFetch>,
    pending_key: Option<RequestId>,
    pending_turn_off: Option<RequestId>,
    turn_off_status: TurnOffFlowStatus,
}

impl<P: PreferenceStore> UnlockService<P> {
    /// Create a service over an optional preference backend.
    ///
    /// A sign-in service starts with the screen locked; it runs on the login
    /// screen.
    pub fn new(config: ServiceConfig, prefs: Option<P>) -> Self {
        Self {
            power: PowerStateMonitor::new(config.wake_grace),
            policy_allowed: config.policy_allowed,
            screen_locked: config.kind == ServiceKind::Signin,
            config,
            hardlock: HardlockStore::new(prefs),
            active_user: None,
            remote_devices: None,
            wrapped_secret: Vec::new(),
            radio: RadioAdapterMonitor::new(),
            screenlock: None,
            attempt: None,
            observers: ObserverList::default(),
            session_started: false,
            app_manager_ready: false,
            app_loaded: false,
            key_checked: false,
            shut_down: false,
            next_request: 0,
            pending_fetches: HashMap::new(),
            pending_key: None,
            pending_turn_off: None,
            turn_off_status: TurnOffFlowStatus::Idle,
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Regular or sign-in service.
    pub fn kind(&self) -> ServiceKind {
        self.config.kind
    }

    /// Currently focused user.
    pub fn active_user(&self) -> Option<&UserId> {
        self.active_user.as_ref()
    }

    /// Known remote devices; `None` when not loaded yet.
    pub fn remote_devices(&self) -> Option<&[RemoteDevice]> {
        self.remote_devices.as_deref()
    }

    /// Fingerprints of the known remote devices.
    pub fn paired_devices(&self) -> PairedDeviceSet {
        paired_device_set(self.remote_devices())
    }

    /// Radio adapter monitor.
    pub fn radio(&self) -> &RadioAdapterMonitor {
        &self.radio
    }

    /// Power monitor.
    pub fn power(&self) -> &PowerStateMonitor {
        &self.power
    }

    /// Lock screen controller, if one exists.
    pub fn screenlock(&self) -> Option<&ScreenlockStateController> {
        self.screenlock.as_ref()
    }

    /// In-flight attempt, if any.
    pub fn attempt(&self) -> Option<&AuthAttempt> {
        self.attempt.as_ref()
    }

    /// Whether the companion app manager reported ready.
    pub fn is_initialized(&self) -> bool {
        self.app_manager_ready
    }

    /// Whether the companion app is loaded.
    pub fn is_app_loaded(&self) -> bool {
        self.app_loaded
    }

    /// Whether the screen is locked.
    pub fn is_screen_locked(&self) -> bool {
        self.screen_locked
    }

    /// Whether [`UnlockService::shutdown`] ran.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Deadline at which the runtime must deliver [`ServiceEvent::Tick`].
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.power.grace_deadline()
    }

    /// Whether proximity unlock may run right now.
    pub fn is_allowed(&self) -> bool {
        !self.shut_down
            && !self.config.feature_disabled
            && self.policy_allowed
            && self.radio.is_present()
    }

    /// Whether the active user has at least one paired device.
    pub fn is_enabled(&self) -> bool {
        self.remote_devices.as_ref().is_some_and(|devices| !devices.is_empty())
    }

    /// Snapshot of the externally visible state.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active_user: self.active_user.clone(),
            allowed: self.is_allowed(),
            enabled: self.is_enabled(),
            app_loaded: self.app_loaded,
            radio: self.radio.state(),
            screen_locked: self.screen_locked,
            hardlock: self.hardlock_state(),
            screenlock: self.screenlock.as_ref().map(ScreenlockStateController::state),
            turn_off: self.turn_off_status,
        }
    }

    /// Settings of the active user.
    pub fn user_settings(&self) -> UserSettings {
        match &self.active_user {
            Some(user) => UserSettings::load(self.hardlock.prefs(), user),
            None => UserSettings::default(),
        }
    }

    /// Mirror the active user's settings into the shared store.
    pub fn store_user_settings(&self, settings: UserSettings) {
        let (Some(prefs), Some(user)) = (self.hardlock.prefs(), &self.active_user) else {
            return;
        };
        if let Err(error) = settings.store(prefs, user) {
            warn!(%user, %error, "failed to store user settings");
        }
    }

    /// Register an observer.
    pub fn add_observer(&mut self, observer: Box<dyn ServiceObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Unregister an observer. Returns whether it was registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Dispatch an event.
    pub fn handle(&mut self, event: ServiceEvent, now: Instant) -> Vec<ServiceAction> {
        if self.shut_down {
            debug!(?event, "service shut down, dropping event");
            return Vec::new();
        }

        match event {
            ServiceEvent::AppManagerReady => self.on_app_manager_ready(),
            ServiceEvent::RadioAdapterDiscovered { present } => {
                self.on_radio_discovered(present, now)
            },
            ServiceEvent::RadioAdapterUnavailable => self.on_radio_unavailable(now),
            ServiceEvent::RadioPresenceChanged { present } => {
                self.on_radio_presence_changed(present, now)
            },
            ServiceEvent::SuspendImminent => self.prepare_for_suspend(now),
            ServiceEvent::SuspendDone { sleep_duration } => {
                self.on_suspend_done(sleep_duration, now)
            },
            ServiceEvent::Tick => self.tick(now),
            ServiceEvent::SessionStarted => {
                self.session_started = true;
                self.update_app_state(now)
            },
            ServiceEvent::PolicyChanged { allowed } => {
                self.policy_allowed = allowed;
                self.update_app_state(now)
            },
            ServiceEvent::ActiveUserChanged { user } => self.set_active_user(user, now),
            ServiceEvent::RemoteDevicesChanged { devices } => {
                self.set_remote_devices(devices, now)
            },
            ServiceEvent::CheckPairing => self.check_paired_devices_and_maybe_hardlock(),
            ServiceEvent::TrustedDevicesFetched { request, result } => {
                self.on_trusted_devices_fetched(request, result)
            },
            ServiceEvent::KeyPrepared { request } => {
                self.on_key_prepared(request);
                Vec::new()
            },
            ServiceEvent::TurnOffCompleted { request, success } => {
                self.on_turn_off_completed(request, success)
            },
            ServiceEvent::ScreenDidLock => self.screen_did_lock(),
            ServiceEvent::ScreenDidUnlock => self.screen_did_unlock(),
            ServiceEvent::ScreenlockStateRequested { state } => {
                self.update_screenlock_state(state, now)
            },
            ServiceEvent::AttemptAuth { user } => self.attempt_auth(&user),
            ServiceEvent::FinalizeUnlock { success } => self.finalize_unlock(success),
            ServiceEvent::FinalizeSignin { key } => self.finalize_signin(&key),
            ServiceEvent::LockIconClicked => self.record_click_on_lock_icon(),
            ServiceEvent::WrappedSecretChanged { wrapped_secret } => {
                self.set_wrapped_secret(wrapped_secret);
                Vec::new()
            },
            ServiceEvent::ShowInitialUserState => self.show_initial_user_state(now),
            ServiceEvent::TrialRunRequested => self.set_trial_run(),
            ServiceEvent::TurnOffRequested => self.run_turn_off_flow(),
            ServiceEvent::TurnOffReset => {
                self.reset_turn_off_flow();
                Vec::new()
            },
            ServiceEvent::Shutdown => self.shutdown(),
        }
    }

    /// Ask the companion app manager to get ready.
    pub fn initialize(&self) -> Vec<ServiceAction> {
        if self.shut_down {
            return Vec::new();
        }
        vec![ServiceAction::EnsureAppReady]
    }

    /// The companion app manager is ready; start radio discovery.
    pub fn on_app_manager_ready(&mut self) -> Vec<ServiceAction> {
        self.app_manager_ready = true;
        if self.radio.initialize() {
            vec![ServiceAction::DiscoverRadioAdapter]
        } else {
            Vec::new()
        }
    }

    /// Radio discovery finished.
    pub fn on_radio_discovered(&mut self, present: bool, now: Instant) -> Vec<ServiceAction> {
        if !self.radio.on_discovered(present) {
            return Vec::new();
        }
        debug!(present, "radio adapter discovered");
        self.update_app_state(now)
    }

    /// Radio discovery found no adapter subsystem.
    pub fn on_radio_unavailable(&mut self, now: Instant) -> Vec<ServiceAction> {
        if !self.radio.on_unavailable() {
            return Vec::new();
        }
        self.update_app_state(now)
    }

    /// Radio presence changed.
    pub fn on_radio_presence_changed(&mut self, present: bool, now: Instant) -> Vec<ServiceAction> {
        if !self.radio.on_present_changed(present) {
            return Vec::new();
        }
        debug!(present, "radio adapter presence changed");
        self.update_app_state(now)
    }

    /// The system is about to suspend: the radio will disappear soon.
    pub fn prepare_for_suspend(&mut self, now: Instant) -> Vec<ServiceAction> {
        self.power.on_suspend_imminent();
        let mut actions = self.disable_app_without_resetting_screenlock_state();
        if self.screenlock.as_ref().is_some_and(ScreenlockStateController::is_active) {
            actions.extend(self.update_screenlock_state(ScreenlockState::RadioConnecting, now));
        }
        actions
    }

    /// The system resumed; open the wake grace window and reconcile.
    pub fn on_suspend_done(
        &mut self,
        sleep_duration: Duration,
        now: Instant,
    ) -> Vec<ServiceAction> {
        let deadline = self.power.on_suspend_done(now, sleep_duration);
        let mut actions = vec![ServiceAction::ScheduleWakeup { deadline }];
        actions.extend(self.update_app_state(now));
        actions
    }

    /// A scheduled wakeup fired; reconcile if the grace window closed.
    pub fn tick(&mut self, now: Instant) -> Vec<ServiceAction> {
        if !self.power.tick(now) {
            return Vec::new();
        }
        debug!("wake grace window elapsed");
        self.update_app_state(now)
    }

    /// Reconcile the companion app with the current signals.
    pub fn update_app_state(&mut self, now: Instant) -> Vec<ServiceAction> {
        if self.is_allowed() {
            let mut actions: Vec<_> = self.ensure_key_prepared().into_iter().collect();
            actions.push(ServiceAction::LoadApp);
            self.set_app_loaded(true);
            actions.extend(self.notify_user_updated());
            return actions;
        }

        if self.power.is_waking_up(now) && !self.radio.is_present() {
            debug!("radio absent inside wake grace window, waiting");
            return Vec::new();
        }

        let mut actions = vec![ServiceAction::DisableAppIfLoaded];
        self.set_app_loaded(false);
        actions.extend(self.reset_screenlock_state());
        self.power.reset();
        actions
    }

    /// Switch the focused user. Pending work for the previous user is
    /// dropped.
    pub fn set_active_user(&mut self, user: Option<UserId>, now: Instant) -> Vec<ServiceAction> {
        if self.active_user == user {
            return Vec::new();
        }
        info!(from = ?self.active_user, to = ?user, "active user changed");

        let mut actions = self.reset_screenlock_state();
        self.active_user = user;
        self.remote_devices = None;
        self.wrapped_secret.clear();
        self.pending_fetches.clear();
        actions.extend(self.update_app_state(now));
        actions
    }

    /// Replace the known remote device list.
    pub fn set_remote_devices(
        &mut self,
        devices: Option<Vec<RemoteDevice>>,
        now: Instant,
    ) -> Vec<ServiceAction> {
        self.remote_devices = devices;
        self.update_app_state(now)
    }

    /// Set the sealed secret used by sign-in attempts.
    pub fn set_wrapped_secret(&mut self, wrapped_secret: Vec<u8>) {
        self.wrapped_secret = wrapped_secret;
    }

    /// Persisted hardlock state of the active user.
    pub fn hardlock_state(&self) -> HardlockState {
        match &self.active_user {
            Some(user) => self.hardlock.get(user),
            None => HardlockState::NoHardlock,
        }
    }

    /// Set the active user's hardlock state.
    pub fn set_hardlock_state(&mut self, state: HardlockState) -> Vec<ServiceAction> {
        let Some(user) = self.active_user.clone() else {
            return Vec::new();
        };
        self.set_hardlock_state_for_user(&user, state)
    }

    /// Persist a hardlock state for `user`, updating the lock screen when
    /// `user` is active.
    pub fn set_hardlock_state_for_user(
        &mut self,
        user: &UserId,
        state: HardlockState,
    ) -> Vec<ServiceAction> {
        info!(%user, ?state, "hardlock state set");
        self.hardlock.set(user, state);
        if self.active_user.as_ref() == Some(user) {
            self.set_screenlock_hardlocked_state(state)
        } else {
            Vec::new()
        }
    }

    /// Forget everything persisted for `user`.
    pub fn reset_local_state_for_user(&self, user: &UserId) {
        info!(%user, "resetting local state");
        self.hardlock.reset(user);
    }

    /// Show the persisted state on the lock screen before any hardware
    /// signal arrives.
    pub fn show_initial_user_state(&mut self, now: Instant) -> Vec<ServiceAction> {
        let mut actions = Vec::new();
        if !self.ensure_screenlock_controller(&mut actions) {
            return actions;
        }
        let Some(user) = self.active_user.clone() else {
            return actions;
        };

        match self.hardlock.get_persisted(&user) {
            None => {},
            Some(HardlockState::NoHardlock) => {
                actions.extend(self.update_screenlock_state(ScreenlockState::RadioConnecting, now));
            },
            Some(_) => {
                if let Some(controller) = self.screenlock.as_mut() {
                    actions.extend(lock_actions(controller.maybe_show_hardlock_ui()));
                }
            },
        }
        actions
    }

    /// Route a companion-reported lock screen state through the controller.
    pub fn update_screenlock_state(
        &mut self,
        state: ScreenlockState,
        now: Instant,
    ) -> Vec<ServiceAction> {
        let mut actions = Vec::new();
        if !self.ensure_screenlock_controller(&mut actions) {
            debug!(?state, "no lock screen controller, state dropped");
            return actions;
        }
        let Some(controller) = self.screenlock.as_mut() else {
            return actions;
        };
        actions.extend(lock_actions(controller.change_state(state)));
        let still_valid = controller.in_state_valid_on_remote_auth_failure();

        if state == ScreenlockState::Authenticated {
            if let Some(latency) = self.power.record_startup_time(now) {
                actions.push(ServiceAction::RecordMetric(Metric::StartupTimeFromSuspend(latency)));
            }
        } else if let Some(attempt) = self.attempt.take() {
            actions.extend(attempt.discard());
            if !still_valid {
                actions.extend(self.handle_auth_failure());
            }
        }
        actions
    }

    /// Start an authentication attempt for `user`, which must be active.
    pub fn attempt_auth(&mut self, user: &UserId) -> Vec<ServiceAction> {
        if self.active_user.as_ref() != Some(user) {
            warn!(%user, active = ?self.active_user, "auth attempt for inactive user ignored");
            return Vec::new();
        }

        let mut actions = self.attempt.take().map(AuthAttempt::discard).unwrap_or_default();
        let kind = match self.config.kind {
            ServiceKind::Regular => AttemptKind::Unlock,
            ServiceKind::Signin => AttemptKind::Signin,
        };
        let ctx = AttemptContext {
            screen_locked: self.screen_locked,
            click_to_unlock: self
                .screenlock
                .as_ref()
                .is_some_and(|controller| controller.auth_type() == AuthType::UserClick),
            app_loaded: self.app_loaded,
        };

        let mut attempt = AuthAttempt::new(kind, user.clone());
        match attempt.start(ctx) {
            Ok(started) => {
                actions.extend(started);
                self.attempt = Some(attempt);
            },
            Err(error) => debug!(%user, %error, "auth attempt not started"),
        }
        actions
    }

    /// The companion answered an unlock attempt.
    pub fn finalize_unlock(&mut self, success: bool) -> Vec<ServiceAction> {
        let Some(mut attempt) = self.attempt.take() else {
            return Vec::new();
        };
        let user = attempt.user().clone();
        let mut actions = attempt.finalize_unlock(&user, success);
        actions.extend(attempt.discard());

        if !success {
            actions.push(ServiceAction::RecordMetric(Metric::UnlockFailed));
            actions.extend(self.handle_auth_failure_for(&user));
        }
        actions
    }

    /// The companion answered a sign-in attempt. An empty key is a
    /// cancellation and is handled as a failure.
    pub fn finalize_signin(&mut self, key: &[u8]) -> Vec<ServiceAction> {
        let Some(mut attempt) = self.attempt.take() else {
            return Vec::new();
        };
        let user = attempt.user().clone();
        let mut actions = Vec::new();
        if !self.wrapped_secret.is_empty() {
            actions.extend(attempt.finalize_signin(&user, &self.wrapped_secret, key));
        }
        actions.extend(attempt.discard());

        if key.is_empty() {
            actions.extend(self.handle_auth_failure_for(&user));
        }
        actions
    }

    /// Compare the local paired set with the registry's and hardlock on
    /// drift.
    pub fn check_paired_devices_and_maybe_hardlock(&mut self) -> Vec<ServiceAction> {
        let Some(user) = self.active_user.clone() else {
            return Vec::new();
        };

        let paired = self.paired_devices();
        if paired.is_empty() {
            return self.set_hardlock_state_for_user(&user, HardlockState::NoPairing);
        }
        if self.hardlock.get(&user).is_pairing_drift() {
            debug!(%user, "pairing change already recorded, skipping check");
            return Vec::new();
        }

        let request = self.next_request_id();
        self.pending_fetches.insert(request, PendingFetch { user: user.clone(), paired });
        vec![ServiceAction::FetchTrustedDevices { request, user }]
    }

    /// Registry answered a trusted device fetch.
    pub fn on_trusted_devices_fetched(
        &mut self,
        request: RequestId,
        result: Result<PairedDeviceSet, FetchFailed>,
    ) -> Vec<ServiceAction> {
        let Some(pending) = self.pending_fetches.remove(&request) else {
            debug!(%request, "stale trusted device reply dropped");
            return Vec::new();
        };
        if self.active_user.as_ref() != Some(&pending.user) {
            debug!(%request, user = %pending.user, "trusted device reply for inactive user dropped");
            return Vec::new();
        }
        if self.hardlock.get(&pending.user).is_pairing_drift() {
            return Vec::new();
        }

        match drift_hardlock(&pending.paired, result.as_ref().map_err(|_| FetchFailed)) {
            Some(state) => self.set_hardlock_state_for_user(&pending.user, state),
            None => Vec::new(),
        }
    }

    /// Reset the lock screen and reload the companion app.
    pub fn reload_app_and_lock_screen(&mut self) -> Vec<ServiceAction> {
        let mut actions = self.reset_screenlock_state();
        actions.push(ServiceAction::ReloadApp);
        actions.extend(self.notify_user_updated());
        actions
    }

    /// Open the setup flow.
    pub fn open_setup_app(&self) -> Vec<ServiceAction> {
        vec![ServiceAction::LaunchSetup]
    }

    /// Disable the companion app, leaving the lock screen untouched.
    pub fn disable_app_without_resetting_screenlock_state(&mut self) -> Vec<ServiceAction> {
        self.set_app_loaded(false);
        vec![ServiceAction::DisableAppIfLoaded]
    }

    /// Start the first-run walkthrough. Regular service only.
    pub fn set_trial_run(&mut self) -> Vec<ServiceAction> {
        if self.config.kind != ServiceKind::Regular {
            warn!("trial run requested on sign-in service");
            return Vec::new();
        }
        let mut actions = Vec::new();
        if !self.ensure_screenlock_controller(&mut actions) {
            return actions;
        }
        if let Some(commands) = self.screenlock.as_mut().and_then(|c| c.set_trial_run()) {
            actions.extend(lock_actions(commands));
            actions.push(ServiceAction::RecordMetric(Metric::TrialRun(TrialRunEvent::Launched)));
        }
        actions
    }

    /// The user clicked the lock icon.
    pub fn record_click_on_lock_icon(&self) -> Vec<ServiceAction> {
        match &self.screenlock {
            Some(controller) if controller.record_click_on_lock_icon() => {
                vec![ServiceAction::RecordMetric(Metric::TrialRun(TrialRunEvent::ClickedLockIcon))]
            },
            _ => Vec::new(),
        }
    }

    /// The screen locked.
    pub fn screen_did_lock(&mut self) -> Vec<ServiceAction> {
        self.screen_locked = true;
        match self.screenlock.as_mut() {
            Some(controller) => lock_actions(controller.screen_did_lock()).collect(),
            None => Vec::new(),
        }
    }

    /// The screen unlocked.
    pub fn screen_did_unlock(&mut self) -> Vec<ServiceAction> {
        self.screen_locked = false;
        let saw_locked_remote =
            self.screenlock.as_mut().and_then(ScreenlockStateController::screen_did_unlock);
        match saw_locked_remote {
            Some(saw_locked_remote) => {
                vec![ServiceAction::RecordMetric(Metric::ManualRemoteUnlock { saw_locked_remote })]
            },
            None => Vec::new(),
        }
    }

    /// Why a password login happened; `None` when the feature is not
    /// enabled for the active user.
    pub fn password_auth_event(&self) -> Option<PasswordAuthEvent> {
        if !self.is_enabled() {
            return None;
        }
        Some(PasswordAuthEvent::classify(
            self.hardlock_state(),
            self.screenlock.as_ref().map(ScreenlockStateController::state),
        ))
    }

    /// Record a password login by `user`.
    pub fn record_password_login_event(&self, user: &UserId) -> Vec<ServiceAction> {
        if self.active_user.as_ref() != Some(user) {
            return Vec::new();
        }
        self.password_auth_event()
            .map(|event| ServiceAction::RecordMetric(Metric::PasswordAuth(event)))
            .into_iter()
            .collect()
    }

    /// Turn proximity unlock off on the remote side. Regular service only.
    pub fn run_turn_off_flow(&mut self) -> Vec<ServiceAction> {
        if self.config.kind != ServiceKind::Regular
            || self.turn_off_status == TurnOffFlowStatus::Pending
        {
            return Vec::new();
        }
        self.set_turn_off_status(TurnOffFlowStatus::Pending);
        let request = self.next_request_id();
        self.pending_turn_off = Some(request);
        vec![ServiceAction::RequestTurnOff { request }]
    }

    /// Abandon the turn-off flow.
    pub fn reset_turn_off_flow(&mut self) {
        self.pending_turn_off = None;
        self.set_turn_off_status(TurnOffFlowStatus::Idle);
    }

    /// Turn-off flow status.
    pub fn turn_off_flow_status(&self) -> TurnOffFlowStatus {
        self.turn_off_status
    }

    /// The remote answered the turn-off request. Success clears the pairing.
    pub fn on_turn_off_completed(&mut self, request: RequestId, success: bool) -> Vec<ServiceAction> {
        if self.pending_turn_off != Some(request) {
            debug!(%request, "stale turn-off reply dropped");
            return Vec::new();
        }
        self.pending_turn_off = None;

        if !success {
            self.set_turn_off_status(TurnOffFlowStatus::Failed);
            return Vec::new();
        }
        info!("proximity unlock turned off, pairing cleared");
        self.remote_devices = Some(Vec::new());
        self.set_turn_off_status(TurnOffFlowStatus::Idle);
        self.reload_app_and_lock_screen()
    }

    /// Stop the service. Idempotent; every later event is inert.
    pub fn shutdown(&mut self) -> Vec<ServiceAction> {
        if self.shut_down {
            return Vec::new();
        }
        info!("shutting down");
        self.shut_down = true;

        let actions = self.reset_screenlock_state();
        self.radio.reset();
        self.power.reset();
        self.pending_fetches.clear();
        self.pending_key = None;
        self.pending_turn_off = None;
        actions
    }

    fn on_key_prepared(&mut self, request: RequestId) {
        if self.pending_key == Some(request) {
            debug!(%request, "secure key prepared");
            self.pending_key = None;
        } else {
            debug!(%request, "stale key preparation reply dropped");
        }
    }

    fn ensure_key_prepared(&mut self) -> Option<ServiceAction> {
        if self.key_checked || self.config.kind != ServiceKind::Regular || !self.session_started {
            return None;
        }
        self.active_user.as_ref()?;

        self.key_checked = true;
        let request = self.next_request_id();
        self.pending_key = Some(request);
        Some(ServiceAction::PrepareKey {
            request,
            check_private_key: self.config.check_private_key,
        })
    }

    fn notify_user_updated(&self) -> Option<ServiceAction> {
        let user = self.active_user.clone()?;
        let logged_in = self.config.kind == ServiceKind::Regular;
        let data_ready = logged_in || self.remote_devices.is_some();
        Some(ServiceAction::SendUserUpdated { user, logged_in, data_ready })
    }

    fn set_app_loaded(&mut self, loaded: bool) {
        if self.app_loaded == loaded {
            return;
        }
        self.app_loaded = loaded;
        let state = if loaded { AppState::Loaded } else { AppState::Disabled };
        info!(?state, "companion app state changed");
        self.observers.notify_app_state(state);
    }

    fn set_turn_off_status(&mut self, status: TurnOffFlowStatus) {
        if self.turn_off_status == status {
            return;
        }
        self.turn_off_status = status;
        self.observers.notify_turn_off_status(status);
    }

    /// Create the lock screen controller if allowed. Returns whether a
    /// controller exists afterwards.
    fn ensure_screenlock_controller(&mut self, actions: &mut Vec<ServiceAction>) -> bool {
        if !self.is_allowed() {
            return false;
        }
        let Some(user) = self.active_user.clone() else {
            return false;
        };
        if self.screenlock.is_none() {
            let hardlock = self.hardlock.get(&user);
            let mut controller = ScreenlockStateController::new(user, hardlock, self.screen_locked);
            actions.extend(lock_actions(controller.maybe_show_hardlock_ui()));
            self.screenlock = Some(controller);
        }
        true
    }

    fn reset_screenlock_state(&mut self) -> Vec<ServiceAction> {
        let mut actions: Vec<_> = match self.screenlock.take() {
            Some(controller) => lock_actions(controller.teardown()).collect(),
            None => Vec::new(),
        };
        if let Some(attempt) = self.attempt.take() {
            actions.extend(attempt.discard());
        }
        actions
    }

    fn set_screenlock_hardlocked_state(&mut self, state: HardlockState) -> Vec<ServiceAction> {
        let mut actions: Vec<_> = match self.screenlock.as_mut() {
            Some(controller) => lock_actions(controller.set_hardlock_state(state)).collect(),
            None => Vec::new(),
        };
        if state.is_hardlocked() {
            if let Some(attempt) = self.attempt.take() {
                actions.extend(attempt.discard());
            }
        }
        actions
    }

    fn handle_auth_failure(&mut self) -> Vec<ServiceAction> {
        match self.active_user.clone() {
            Some(user) => self.handle_auth_failure_for(&user),
            None => Vec::new(),
        }
    }

    fn handle_auth_failure_for(&mut self, user: &UserId) -> Vec<ServiceAction> {
        if self.active_user.as_ref() != Some(user) {
            debug!(%user, "auth failure for inactive user ignored");
            return Vec::new();
        }
        match self.screenlock.as_mut() {
            Some(controller) => {
                lock_actions(controller.set_hardlock_state(HardlockState::LoginFailed)).collect()
            },
            None => Vec::new(),
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId::from_raw(self.next_request)
    }
}

fn lock_actions(commands: Vec<LockScreenCommand>) -> impl Iterator<Item = ServiceAction> {
    commands.into_iter().map(ServiceAction::LockScreen)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{attempt::wrap_secret, prefs::MemoryPreferences, types::DeviceId};

    fn alice() -> UserId {
        UserId::new("alice@example.com")
    }

    fn device(psk: &str) -> RemoteDevice {
        RemoteDevice {
            bluetooth_address: "00:11:22:33:44:55".into(),
            public_key: vec![1],
            psk: DeviceId::from(psk),
        }
    }

    /// Service with the radio present, alice active with one device, screen
    /// locked.
    fn ready_service(config: ServiceConfig) -> (UnlockService<MemoryPreferences>, Instant) {
        let t0 = Instant::now();
        let mut service = UnlockService::new(config, Some(MemoryPreferences::new()));
        service.handle(ServiceEvent::AppManagerReady, t0);
        service.handle(ServiceEvent::RadioAdapterDiscovered { present: true }, t0);
        service.handle(ServiceEvent::ActiveUserChanged { user: Some(alice()) }, t0);
        service.handle(ServiceEvent::RemoteDevicesChanged { devices: Some(vec![device("a")]) }, t0);
        service.handle(ServiceEvent::ScreenDidLock, t0);
        (service, t0)
    }

    fn authenticated(config: ServiceConfig) -> (UnlockService<MemoryPreferences>, Instant) {
        let (mut service, t0) = ready_service(config);
        service.update_screenlock_state(ScreenlockState::Authenticated, t0);
        (service, t0)
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<AppState>>>);

    impl ServiceObserver for Recorder {
        fn on_app_state_changed(&mut self, state: AppState) {
            self.0.lock().unwrap().push(state);
        }
    }

    #[test]
    fn initialize_then_discover() {
        let t0 = Instant::now();
        let mut service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        assert_eq!(service.initialize(), vec![ServiceAction::EnsureAppReady]);

        let actions = service.handle(ServiceEvent::AppManagerReady, t0);
        assert_eq!(actions, vec![ServiceAction::DiscoverRadioAdapter]);
        assert!(!service.is_allowed());

        let actions = service.handle(ServiceEvent::RadioAdapterDiscovered { present: true }, t0);
        assert!(actions.contains(&ServiceAction::LoadApp));
        assert!(service.is_allowed());
        assert!(service.is_app_loaded());
    }

    #[test]
    fn unavailable_during_discovery_disables() {
        let t0 = Instant::now();
        let mut service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        service.handle(ServiceEvent::AppManagerReady, t0);

        let actions = service.handle(ServiceEvent::RadioAdapterUnavailable, t0);
        assert_eq!(actions, vec![ServiceAction::DisableAppIfLoaded]);
        assert_eq!(service.radio().state(), RadioState::Unavailable);
        assert!(!service.is_app_loaded());
    }

    #[test]
    fn late_unavailable_reply_keeps_app_loaded() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        service.update_screenlock_state(ScreenlockState::RemoteLocked, t0);

        let actions = service.handle(ServiceEvent::RadioAdapterUnavailable, t0);
        assert!(actions.is_empty());
        assert!(service.is_allowed());
        assert!(service.is_app_loaded());
        assert_eq!(service.radio().state(), RadioState::Discovered { present: true });
        assert!(service.screenlock().is_some());
    }

    #[test]
    fn policy_and_kill_switch() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        service.handle(ServiceEvent::PolicyChanged { allowed: false }, t0);
        assert!(!service.is_allowed());
        assert!(!service.is_app_loaded());

        let config = ServiceConfig { feature_disabled: true, ..ServiceConfig::default() };
        let (service, _) = ready_service(config);
        assert!(!service.is_allowed());
    }

    #[test]
    fn key_prepared_once_per_session() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        let actions = service.handle(ServiceEvent::SessionStarted, t0);
        let prepares =
            actions.iter().filter(|a| matches!(a, ServiceAction::PrepareKey { .. })).count();
        assert_eq!(prepares, 1);

        let actions = service.update_app_state(t0);
        assert!(!actions.iter().any(|a| matches!(a, ServiceAction::PrepareKey { .. })));
    }

    #[test]
    fn observers_see_app_state_flips() {
        let recorder = Recorder::default();
        let (mut service, t0) = ready_service(ServiceConfig::default());
        let id = service.add_observer(Box::new(recorder.clone()));

        service.handle(ServiceEvent::RadioPresenceChanged { present: false }, t0);
        service.update_app_state(t0);
        service.handle(ServiceEvent::RadioPresenceChanged { present: true }, t0);

        assert_eq!(*recorder.0.lock().unwrap(), vec![AppState::Disabled, AppState::Loaded]);
        assert!(service.remove_observer(id));
        assert!(!service.remove_observer(id));
    }

    #[test]
    fn grace_window_defers_disable() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        service.handle(ServiceEvent::SuspendImminent, t0);

        let t1 = t0 + Duration::from_secs(2);
        let actions =
            service.handle(ServiceEvent::SuspendDone { sleep_duration: Duration::from_secs(2) }, t1);
        assert!(actions.contains(&ServiceAction::ScheduleWakeup { deadline: t1 + Duration::from_secs(5) }));

        let actions = service.handle(ServiceEvent::RadioPresenceChanged { present: false }, t1);
        assert!(actions.is_empty());

        let t2 = t1 + Duration::from_secs(6);
        let actions = service.handle(ServiceEvent::Tick, t2);
        assert!(actions.contains(&ServiceAction::DisableAppIfLoaded));
    }

    #[test]
    fn state_change_outside_allow_list_fails_attempt() {
        let (mut service, t0) = authenticated(ServiceConfig::default());
        let actions = service.attempt_auth(&alice());
        assert_eq!(actions, vec![ServiceAction::NotifyAuthAttempt { user: alice() }]);

        service.update_screenlock_state(ScreenlockState::RemoteNotAuthenticated, t0);
        assert!(service.attempt().is_none());
        assert_eq!(
            service.screenlock().map(ScreenlockStateController::hardlock_state),
            Some(HardlockState::LoginFailed)
        );
        // Login failures live on the lock screen only
        assert_eq!(service.hardlock_state(), HardlockState::NoHardlock);
    }

    #[test]
    fn state_change_inside_allow_list_keeps_hardlock() {
        let (mut service, t0) = authenticated(ServiceConfig::default());
        service.attempt_auth(&alice());

        let actions = service.update_screenlock_state(ScreenlockState::RemoteLocked, t0);
        assert!(actions.contains(&ServiceAction::LockScreen(LockScreenCommand::EnableInput)));
        assert!(service.attempt().is_none());
        assert_eq!(
            service.screenlock().map(ScreenlockStateController::hardlock_state),
            Some(HardlockState::NoHardlock)
        );
    }

    #[test]
    fn attempt_for_other_user_ignored() {
        let (mut service, _) = authenticated(ServiceConfig::default());
        assert!(service.attempt_auth(&UserId::new("bob@example.com")).is_empty());
        assert!(service.attempt().is_none());
    }

    #[test]
    fn attempt_requires_click_to_unlock() {
        let (mut service, _) = ready_service(ServiceConfig::default());
        assert!(service.attempt_auth(&alice()).is_empty());
        assert!(service.attempt().is_none());
    }

    #[test]
    fn finalize_unlock_success_and_failure() {
        let (mut service, _) = authenticated(ServiceConfig::default());
        service.attempt_auth(&alice());
        let actions = service.finalize_unlock(true);
        assert_eq!(actions, vec![ServiceAction::LockScreen(LockScreenCommand::Unlock { user: alice() })]);

        service.attempt_auth(&alice());
        let actions = service.finalize_unlock(false);
        assert!(actions.contains(&ServiceAction::RecordMetric(Metric::UnlockFailed)));
        assert_eq!(
            service.screenlock().map(ScreenlockStateController::hardlock_state),
            Some(HardlockState::LoginFailed)
        );
    }

    #[test]
    fn finalize_signin_with_secret() {
        let key = [3u8; 32];
        let config = ServiceConfig { kind: ServiceKind::Signin, ..ServiceConfig::default() };
        let (mut service, _) = authenticated(config);
        service.set_wrapped_secret(wrap_secret(b"pw", &key).unwrap());
        service.attempt_auth(&alice());

        let actions = service.finalize_signin(&key);
        assert!(actions.iter().any(|a| matches!(
            a,
            ServiceAction::LockScreen(LockScreenCommand::AttemptSignin { secret, .. }) if secret == b"pw"
        )));
        assert!(service.attempt().is_none());
    }

    #[test]
    fn signin_secret_arrives_as_event() {
        let key = [5u8; 32];
        let config = ServiceConfig { kind: ServiceKind::Signin, ..ServiceConfig::default() };
        let (mut service, t0) = authenticated(config);
        let wrapped_secret = wrap_secret(b"pw", &key).unwrap();

        let actions = service.handle(ServiceEvent::WrappedSecretChanged { wrapped_secret }, t0);
        assert!(actions.is_empty());
        service.handle(ServiceEvent::AttemptAuth { user: alice() }, t0);
        let actions = service.handle(ServiceEvent::FinalizeSignin { key: key.to_vec() }, t0);

        assert!(actions.iter().any(|a| matches!(
            a,
            ServiceAction::LockScreen(LockScreenCommand::AttemptSignin { secret, .. }) if secret == b"pw"
        )));
    }

    #[test]
    fn frontend_requests_dispatch() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        service.set_hardlock_state(HardlockState::NoHardlock);

        service.handle(ServiceEvent::ShowInitialUserState, t0);
        assert_eq!(
            service.screenlock().map(ScreenlockStateController::state),
            Some(ScreenlockState::RadioConnecting)
        );

        let actions = service.handle(ServiceEvent::TrialRunRequested, t0);
        let launched = ServiceAction::RecordMetric(Metric::TrialRun(TrialRunEvent::Launched));
        assert!(actions.contains(&launched));

        let actions = service.handle(ServiceEvent::TurnOffRequested, t0);
        assert!(matches!(actions.as_slice(), [ServiceAction::RequestTurnOff { .. }]));
        assert_eq!(service.turn_off_flow_status(), TurnOffFlowStatus::Pending);

        assert!(service.handle(ServiceEvent::TurnOffReset, t0).is_empty());
        assert_eq!(service.turn_off_flow_status(), TurnOffFlowStatus::Idle);
    }

    #[test]
    fn drift_check_flow() {
        let (mut service, _) = ready_service(ServiceConfig::default());
        let actions = service.check_paired_devices_and_maybe_hardlock();
        let [ServiceAction::FetchTrustedDevices { request, .. }] = actions.as_slice() else {
            panic!("expected a fetch, got {actions:?}");
        };
        let request = *request;

        let fetched: PairedDeviceSet = [DeviceId::from("b")].into_iter().collect();
        service.on_trusted_devices_fetched(request, Ok(fetched.clone()));
        assert_eq!(service.hardlock_state(), HardlockState::PairingChanged);

        // Sticky: no further fetch
        assert!(service.check_paired_devices_and_maybe_hardlock().is_empty());
        // Replayed reply is stale
        assert!(service.on_trusted_devices_fetched(request, Ok(fetched)).is_empty());
    }

    #[test]
    fn empty_local_set_is_no_pairing() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        service.set_remote_devices(Some(Vec::new()), t0);
        let actions = service.check_paired_devices_and_maybe_hardlock();
        assert!(!actions.iter().any(|a| matches!(a, ServiceAction::FetchTrustedDevices { .. })));
        assert_eq!(service.hardlock_state(), HardlockState::NoPairing);
        assert!(!service.is_enabled());
    }

    #[test]
    fn initial_user_state_from_persisted_hardlock() {
        let prefs = MemoryPreferences::new();
        HardlockStore::new(Some(prefs.clone())).set(&alice(), HardlockState::UserHardlock);

        let t0 = Instant::now();
        let mut service = UnlockService::new(ServiceConfig::default(), Some(prefs));
        service.handle(ServiceEvent::AppManagerReady, t0);
        service.handle(ServiceEvent::RadioAdapterDiscovered { present: true }, t0);
        service.handle(ServiceEvent::ScreenDidLock, t0);
        service.handle(ServiceEvent::ActiveUserChanged { user: Some(alice()) }, t0);

        let actions = service.show_initial_user_state(t0);
        assert!(actions.iter().any(|a| matches!(
            a,
            ServiceAction::LockScreen(LockScreenCommand::ShowIcon {
                icon: crate::screenlock::LockIcon::Hardlocked,
                ..
            })
        )));
    }

    #[test]
    fn password_auth_event_mapping() {
        let (mut service, t0) = ready_service(ServiceConfig::default());
        assert_eq!(service.password_auth_event(), Some(PasswordAuthEvent::NoScreenlockController));

        service.update_screenlock_state(ScreenlockState::SignalTooWeak, t0);
        assert_eq!(service.password_auth_event(), Some(PasswordAuthEvent::SignalTooWeak));

        service.set_hardlock_state(HardlockState::UserHardlock);
        assert_eq!(
            service.record_password_login_event(&alice()),
            vec![ServiceAction::RecordMetric(Metric::PasswordAuth(PasswordAuthEvent::UserHardlock))]
        );
    }

    #[test]
    fn turn_off_flow() {
        let (mut service, _) = ready_service(ServiceConfig::default());
        let actions = service.run_turn_off_flow();
        let [ServiceAction::RequestTurnOff { request }] = actions.as_slice() else {
            panic!("expected a turn-off request, got {actions:?}");
        };
        let request = *request;
        assert_eq!(service.turn_off_flow_status(), TurnOffFlowStatus::Pending);
        assert!(service.run_turn_off_flow().is_empty());

        service.on_turn_off_completed(request, false);
        assert_eq!(service.turn_off_flow_status(), TurnOffFlowStatus::Failed);

        let actions = service.run_turn_off_flow();
        let [ServiceAction::RequestTurnOff { request }] = actions.as_slice() else {
            panic!("expected a turn-off request, got {actions:?}");
        };
        let actions = service.on_turn_off_completed(*request, true);
        assert!(actions.contains(&ServiceAction::ReloadApp));
        assert_eq!(service.turn_off_flow_status(), TurnOffFlowStatus::Idle);
        assert!(!service.is_enabled());
    }

    #[test]
    fn shutdown_is_idempotent_and_final() {
        let (mut service, t0) = authenticated(ServiceConfig::default());
        let actions = service.handle(ServiceEvent::Shutdown, t0);
        assert!(actions.iter().any(|a| matches!(a, ServiceAction::LockScreen(LockScreenCommand::HideIcon { .. }))));
        assert!(service.shutdown().is_empty());
        assert!(!service.is_allowed());
        assert!(service.handle(ServiceEvent::RadioAdapterDiscovered { present: true }, t0).is_empty());
        assert!(service.screenlock().is_none());
    }

    #[test]
    fn trial_run_metrics() {
        let (mut service, _) = authenticated(ServiceConfig::default());
        assert!(service.record_click_on_lock_icon().is_empty());

        let actions = service.set_trial_run();
        assert!(actions.contains(&ServiceAction::RecordMetric(Metric::TrialRun(TrialRunEvent::Launched))));
        assert_eq!(
            service.record_click_on_lock_icon(),
            vec![ServiceAction::RecordMetric(Metric::TrialRun(TrialRunEvent::ClickedLockIcon))]
        );
    }

    #[test]
    fn status_snapshot() {
        let (service, _) = authenticated(ServiceConfig::default());
        let status = service.status();
        assert_eq!(status.active_user, Some(alice()));
        assert!(status.allowed && status.enabled && status.app_loaded && status.screen_locked);
        assert_eq!(status.radio, RadioState::Discovered { present: true });
        assert_eq!(status.screenlock, Some(ScreenlockState::Authenticated));
        assert_eq!(status.turn_off, TurnOffFlowStatus::Idle);
    }

    #[test]
    fn user_settings_round_through_store() {
        let (service, _) = ready_service(ServiceConfig::default());
        service.store_user_settings(UserSettings { require_close_proximity: true });
        assert!(service.user_settings().require_close_proximity);
    }
}
