//! Simulated world around one unlock service.
//!
//! [`SimWorld`] executes every [`ServiceAction`] against in-memory fakes:
//! fire-and-forget calls mutate fake state immediately, calls with a
//! completion are parked as [`Completion`]s until the test delivers them.
//! Replies are computed at delivery time, so a test can change what the
//! registry answers between request and reply.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use nearlock_core::{
    Environment, FetchFailed, HardlockState, HardlockStore, LockIcon, LockScreenCommand,
    MemoryPreferences, Metric, PairedDeviceSet, RequestId, ServiceAction, ServiceConfig,
    ServiceEvent, UnlockService, UserId,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::sim_env::SimEnv;

/// Outstanding collaborator call awaiting delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// App manager readiness.
    AppReady,
    /// Radio adapter discovery.
    RadioDiscovery,
    /// Secure key preparation.
    KeyPreparation {
        /// Request tag.
        request: RequestId,
    },
    /// Trusted device fetch.
    TrustedDevices {
        /// Request tag.
        request: RequestId,
        /// User the fetch is for.
        user: UserId,
    },
    /// Remote turn-off.
    TurnOff {
        /// Request tag.
        request: RequestId,
    },
}

/// The service plus fake collaborators and a virtual clock
pub struct SimWorld {
    env: SimEnv,
    prefs: MemoryPreferences,
    service: UnlockService<MemoryPreferences>,
    rng: ChaCha8Rng,

    radio: Option<bool>,
    registry: HashMap<UserId, Result<PairedDeviceSet, FetchFailed>>,
    turn_off_accepted: bool,

    pending: Vec<Completion>,
    wakeup: Option<Instant>,

    app_loaded: bool,
    app_loads: usize,
    app_disables: usize,
    app_reloads: usize,
    setup_launches: usize,
    key_preparations: usize,
    user_updates: Vec<(UserId, bool, bool)>,
    auth_attempts: Vec<UserId>,
    lock_screen: Vec<LockScreenCommand>,
    metrics: Vec<Metric>,
}

impl SimWorld {
    /// Create a world with seed 0.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_seed(config, 0)
    }

    /// Create a world whose shuffled deliveries follow `seed`.
    pub fn with_seed(config: ServiceConfig, seed: u64) -> Self {
        let prefs = MemoryPreferences::new();
        Self {
            env: SimEnv::new(),
            service: UnlockService::new(config, Some(prefs.clone())),
            prefs,
            rng: ChaCha8Rng::seed_from_u64(seed),
            radio: Some(true),
            registry: HashMap::new(),
            turn_off_accepted: true,
            pending: Vec::new(),
            wakeup: None,
            app_loaded: false,
            app_loads: 0,
            app_disables: 0,
            app_reloads: 0,
            setup_launches: 0,
            key_preparations: 0,
            user_updates: Vec::new(),
            auth_attempts: Vec::new(),
            lock_screen: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Initialize the service and deliver every reply that follows.
    pub fn start(&mut self) {
        let actions = self.service.initialize();
        self.apply(actions);
        self.deliver_all();
    }

    /// The service under test.
    pub fn service(&self) -> &UnlockService<MemoryPreferences> {
        &self.service
    }

    /// Mutable access for direct operation calls.
    pub fn service_mut(&mut self) -> &mut UnlockService<MemoryPreferences> {
        &mut self.service
    }

    /// Virtual clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Current virtual instant.
    pub fn now(&self) -> Instant {
        self.env.now()
    }

    /// Shared preference store.
    pub fn prefs(&self) -> &MemoryPreferences {
        &self.prefs
    }

    /// Hardlock state persisted for `user`, read straight from the store.
    pub fn persisted_hardlock(&self, user: &UserId) -> Option<HardlockState> {
        HardlockStore::new(Some(self.prefs.clone())).get_persisted(user)
    }

    /// What radio discovery reports. `None` means no adapter subsystem.
    pub fn set_radio(&mut self, radio: Option<bool>) {
        self.radio = radio;
    }

    /// What the registry answers for `user`.
    pub fn set_trusted_devices(
        &mut self,
        user: UserId,
        devices: Result<PairedDeviceSet, FetchFailed>,
    ) {
        self.registry.insert(user, devices);
    }

    /// Whether the remote accepts turn-off requests.
    pub fn set_turn_off_accepted(&mut self, accepted: bool) {
        self.turn_off_accepted = accepted;
    }

    /// Feed an event to the service at the current virtual time.
    pub fn dispatch(&mut self, event: ServiceEvent) {
        let actions = self.service.handle(event, self.env.now());
        self.apply(actions);
    }

    /// Execute actions against the fakes.
    pub fn apply(&mut self, actions: Vec<ServiceAction>) {
        for action in actions {
            self.apply_one(action);
        }
    }

    /// Advance the clock, delivering [`ServiceEvent::Tick`] at the
    /// scheduled wakeup if it falls inside the interval.
    pub fn advance(&mut self, duration: Duration) {
        let target = self.env.now() + duration;
        while let Some(deadline) = self.wakeup.filter(|deadline| *deadline <= target) {
            self.env.advance_to(deadline);
            self.wakeup = None;
            self.dispatch(ServiceEvent::Tick);
        }
        self.env.advance_to(target);
    }

    /// Replies not delivered yet.
    pub fn pending(&self) -> &[Completion] {
        &self.pending
    }

    /// Deliver the oldest pending reply. Returns whether one was pending.
    pub fn deliver_next(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let completion = self.pending.remove(0);
        self.deliver(completion);
        true
    }

    /// Deliver a randomly chosen pending reply.
    pub fn deliver_random(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let index = self.rng.gen_range(0..self.pending.len());
        let completion = self.pending.remove(index);
        self.deliver(completion);
        true
    }

    /// Deliver replies in order until none are pending.
    pub fn deliver_all(&mut self) {
        while self.deliver_next() {}
    }

    /// Deliver replies in seeded random order until none are pending.
    pub fn deliver_all_shuffled(&mut self) {
        while self.deliver_random() {}
    }

    /// Drop every pending reply without delivering it.
    pub fn drop_pending(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.pending)
    }

    /// Scheduled wakeup not delivered yet.
    pub fn wakeup(&self) -> Option<Instant> {
        self.wakeup
    }

    /// Whether the fake companion app is loaded.
    pub fn app_loaded(&self) -> bool {
        self.app_loaded
    }

    /// Number of loads of a previously unloaded app.
    pub fn app_loads(&self) -> usize {
        self.app_loads
    }

    /// Number of disables of a loaded app.
    pub fn app_disables(&self) -> usize {
        self.app_disables
    }

    /// Number of app reloads.
    pub fn app_reloads(&self) -> usize {
        self.app_reloads
    }

    /// Number of setup launches.
    pub fn setup_launches(&self) -> usize {
        self.setup_launches
    }

    /// Number of key preparations requested.
    pub fn key_preparations(&self) -> usize {
        self.key_preparations
    }

    /// User-updated notifications sent to the app, oldest first.
    pub fn user_updates(&self) -> &[(UserId, bool, bool)] {
        &self.user_updates
    }

    /// Users for which the app was told about an attempt.
    pub fn auth_attempts(&self) -> &[UserId] {
        &self.auth_attempts
    }

    /// Lock screen commands, oldest first.
    pub fn lock_screen(&self) -> &[LockScreenCommand] {
        &self.lock_screen
    }

    /// Recorded metrics, oldest first.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Icon the lock screen currently shows, replaying the commands.
    pub fn shown_icon(&self) -> Option<LockIcon> {
        self.lock_screen.iter().fold(None, |icon, command| match command {
            LockScreenCommand::ShowIcon { icon, .. } => Some(*icon),
            LockScreenCommand::HideIcon { .. } => None,
            _ => icon,
        })
    }

    fn apply_one(&mut self, action: ServiceAction) {
        trace!(?action, "applying");
        match action {
            ServiceAction::EnsureAppReady => self.pending.push(Completion::AppReady),
            ServiceAction::LoadApp => {
                if !self.app_loaded {
                    self.app_loaded = true;
                    self.app_loads += 1;
                }
            },
            ServiceAction::DisableAppIfLoaded => {
                if self.app_loaded {
                    self.app_loaded = false;
                    self.app_disables += 1;
                }
            },
            ServiceAction::ReloadApp => self.app_reloads += 1,
            ServiceAction::LaunchSetup => self.setup_launches += 1,
            ServiceAction::SendUserUpdated { user, logged_in, data_ready } => {
                self.user_updates.push((user, logged_in, data_ready));
            },
            ServiceAction::NotifyAuthAttempt { user } => self.auth_attempts.push(user),
            ServiceAction::DiscoverRadioAdapter => self.pending.push(Completion::RadioDiscovery),
            ServiceAction::PrepareKey { request, .. } => {
                self.key_preparations += 1;
                self.pending.push(Completion::KeyPreparation { request });
            },
            ServiceAction::FetchTrustedDevices { request, user } => {
                self.pending.push(Completion::TrustedDevices { request, user });
            },
            ServiceAction::ScheduleWakeup { deadline } => self.wakeup = Some(deadline),
            ServiceAction::RequestTurnOff { request } => {
                self.pending.push(Completion::TurnOff { request });
            },
            ServiceAction::LockScreen(command) => self.lock_screen.push(command),
            ServiceAction::RecordMetric(metric) => self.metrics.push(metric),
        }
    }

    fn deliver(&mut self, completion: Completion) {
        trace!(?completion, "delivering");
        let event = match completion {
            Completion::AppReady => ServiceEvent::AppManagerReady,
            Completion::RadioDiscovery => match self.radio {
                Some(present) => ServiceEvent::RadioAdapterDiscovered { present },
                None => ServiceEvent::RadioAdapterUnavailable,
            },
            Completion::KeyPreparation { request } => ServiceEvent::KeyPrepared { request },
            Completion::TrustedDevices { request, user } => {
                let result = self.registry.get(&user).cloned().unwrap_or(Err(FetchFailed));
                ServiceEvent::TrustedDevicesFetched { request, result }
            },
            Completion::TurnOff { request } => {
                ServiceEvent::TurnOffCompleted { request, success: self.turn_off_accepted }
            },
        };
        self.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_discovers_radio_and_loads() {
        let mut world = SimWorld::new(ServiceConfig::default());
        world.start();

        assert!(world.pending().is_empty());
        assert!(world.service().is_allowed());
        assert!(world.app_loaded());
        assert_eq!(world.app_loads(), 1);
    }

    #[test]
    fn advance_fires_tick_at_deadline() {
        let mut world = SimWorld::new(ServiceConfig::default());
        world.start();
        world.dispatch(ServiceEvent::SuspendImminent);
        world.dispatch(ServiceEvent::SuspendDone { sleep_duration: Duration::from_secs(1) });
        let deadline = world.wakeup().unwrap();

        world.advance(Duration::from_secs(10));
        assert_eq!(world.wakeup(), None);
        assert!(world.now() > deadline);
        assert_eq!(world.service().next_wakeup(), None);
    }

    #[test]
    fn shuffled_delivery_is_seeded() {
        let run = |seed| {
            let mut world = SimWorld::with_seed(ServiceConfig::default(), seed);
            world.pending.extend([
                Completion::AppReady,
                Completion::RadioDiscovery,
                Completion::AppReady,
                Completion::RadioDiscovery,
            ]);
            let mut order = Vec::new();
            while !world.pending.is_empty() {
                let index = world.rng.gen_range(0..world.pending.len());
                order.push(world.pending.remove(index));
            }
            order
        };
        assert_eq!(run(7), run(7));
    }
}
