//! Event loop around the unlock service.
//!
//! The [`Runtime`] is the single owner of the [`UnlockService`]. It pulls
//! events off a channel, feeds them to the service and executes the returned
//! actions. Long-latency collaborator calls run as spawned tasks that post
//! their completion back into the same channel, so the service is never
//! blocked and never touched from two places at once.

use std::time::Instant;

use nearlock_core::{
    Environment, PreferenceStore, ServiceAction, ServiceEvent, ServiceStatus, UnlockService,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{collaborators::Collaborators, error::RuntimeError};

/// Posts events into a running [`Runtime`] and observes its status.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    events: mpsc::UnboundedSender<ServiceEvent>,
    status: watch::Receiver<ServiceStatus>,
}

impl RuntimeHandle {
    /// Queue an event for the service.
    pub fn send(&self, event: ServiceEvent) -> Result<(), RuntimeError> {
        self.events.send(event).map_err(|_| RuntimeError::Closed)
    }

    /// Status as of the last processed event.
    pub fn status(&self) -> ServiceStatus {
        self.status.borrow().clone()
    }

    /// Wait until the status changes. Fails once the runtime stopped.
    pub async fn changed(&mut self) -> Result<ServiceStatus, RuntimeError> {
        self.status.changed().await.map_err(|_| RuntimeError::Closed)?;
        Ok(self.status.borrow_and_update().clone())
    }
}

/// Single-owner event loop executing service actions
pub struct Runtime<E, P> {
    env: E,
    service: UnlockService<P>,
    collaborators: Collaborators,
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
    events_rx: mpsc::UnboundedReceiver<ServiceEvent>,
    status: watch::Sender<ServiceStatus>,
    wakeup: Option<Instant>,
}

impl<E: Environment, P: PreferenceStore> Runtime<E, P> {
    /// Wrap a service. The returned handle feeds the loop.
    pub fn new(
        env: E,
        service: UnlockService<P>,
        collaborators: Collaborators,
    ) -> (Self, RuntimeHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(service.status());
        let handle = RuntimeHandle { events: events_tx.clone(), status: status_rx };
        let runtime =
            Self { env, service, collaborators, events_tx, events_rx, status, wakeup: None };
        (runtime, handle)
    }

    /// The owned service.
    pub fn service(&self) -> &UnlockService<P> {
        &self.service
    }

    /// Mutable access before [`Runtime::run`], e.g. to register observers.
    pub fn service_mut(&mut self) -> &mut UnlockService<P> {
        &mut self.service
    }

    /// Run until the service shuts down, then hand the service back.
    pub async fn run(mut self) -> UnlockService<P> {
        let actions = self.service.initialize();
        self.execute(actions);

        while !self.service.is_shut_down() {
            let event = match self.wakeup {
                Some(deadline) => {
                    let delay = deadline.saturating_duration_since(self.env.now());
                    tokio::select! {
                        event = self.events_rx.recv() => event,
                        () = self.env.sleep(delay) => {
                            self.wakeup = None;
                            Some(ServiceEvent::Tick)
                        },
                    }
                },
                None => self.events_rx.recv().await,
            };
            let Some(event) = event else {
                break;
            };

            self.step(event);
        }

        info!("runtime stopped");
        self.service
    }

    /// Feed one event to the service and execute the resulting actions.
    pub fn step(&mut self, event: ServiceEvent) {
        let now = self.env.now();
        let actions = self.service.handle(event, now);
        self.execute(actions);
        self.status.send_if_modified(|status| {
            let current = self.service.status();
            if *status == current {
                return false;
            }
            *status = current;
            true
        });
    }

    fn execute(&mut self, actions: Vec<ServiceAction>) {
        for action in actions {
            self.execute_one(action);
        }
    }

    fn execute_one(&mut self, action: ServiceAction) {
        let Collaborators { app, keys, registry, lock_screen, radio, remote } = &self.collaborators;

        match action {
            ServiceAction::EnsureAppReady => {
                let app = app.clone();
                self.spawn_completion(async move {
                    app.ensure_ready().await;
                    ServiceEvent::AppManagerReady
                });
            },
            ServiceAction::LoadApp => app.load_app(),
            ServiceAction::DisableAppIfLoaded => app.disable_app_if_loaded(),
            ServiceAction::ReloadApp => app.reload_app(),
            ServiceAction::LaunchSetup => app.launch_setup(),
            ServiceAction::SendUserUpdated { user, logged_in, data_ready } => {
                app.send_user_updated(&user, logged_in, data_ready);
            },
            ServiceAction::NotifyAuthAttempt { user } => app.send_auth_attempt(&user),
            ServiceAction::DiscoverRadioAdapter => {
                let radio = radio.clone();
                self.spawn_completion(async move {
                    match radio.discover().await {
                        Some(present) => ServiceEvent::RadioAdapterDiscovered { present },
                        None => ServiceEvent::RadioAdapterUnavailable,
                    }
                });
            },
            ServiceAction::PrepareKey { request, check_private_key } => {
                let keys = keys.clone();
                self.spawn_completion(async move {
                    keys.prepare_key(check_private_key).await;
                    ServiceEvent::KeyPrepared { request }
                });
            },
            ServiceAction::FetchTrustedDevices { request, user } => {
                let registry = registry.clone();
                self.spawn_completion(async move {
                    let result = registry.fetch_trusted_devices(&user).await;
                    ServiceEvent::TrustedDevicesFetched { request, result }
                });
            },
            ServiceAction::ScheduleWakeup { deadline } => {
                debug!(?deadline, "wakeup scheduled");
                self.wakeup = Some(deadline);
            },
            ServiceAction::RequestTurnOff { request } => {
                let remote = remote.clone();
                self.spawn_completion(async move {
                    let success = remote.turn_off().await;
                    ServiceEvent::TurnOffCompleted { request, success }
                });
            },
            ServiceAction::LockScreen(command) => lock_screen.apply(command),
            ServiceAction::RecordMetric(metric) => lock_screen.record_metric(metric),
        }
    }

    fn spawn_completion<F>(&self, work: F)
    where
        F: Future<Output = ServiceEvent> + Send + 'static,
    {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = work.await;
            if events.send(event).is_err() {
                debug!("runtime gone, completion dropped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use nearlock_core::{
        DeviceId, FetchFailed, LockScreenCommand, MemoryPreferences, Metric, PairedDeviceSet,
        RemoteDevice, ServiceConfig, ServiceObserver, TurnOffFlowStatus, UserId,
    };

    use super::*;
    use crate::{
        SystemEnv,
        collaborators::{
            CompanionApp, KeyPreparer, LockScreenBridge, NoRadioAdapter, RadioAdapter,
            RemoteToggle, TrustedDeviceRegistry,
        },
    };

    #[derive(Default)]
    struct Fake {
        log: Mutex<Vec<String>>,
        radio_present: Mutex<Option<bool>>,
    }

    impl Fake {
        fn push(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompanionApp for Fake {
        async fn ensure_ready(&self) {}

        fn load_app(&self) {
            self.push("load");
        }

        fn disable_app_if_loaded(&self) {
            self.push("disable");
        }

        fn reload_app(&self) {
            self.push("reload");
        }

        fn launch_setup(&self) {
            self.push("setup");
        }

        fn send_user_updated(&self, user: &UserId, _logged_in: bool, _data_ready: bool) {
            self.push(format!("user {user}"));
        }

        fn send_auth_attempt(&self, user: &UserId) {
            self.push(format!("attempt {user}"));
        }
    }

    #[async_trait]
    impl KeyPreparer for Fake {
        async fn prepare_key(&self, _check_private_key: bool) {
            self.push("key");
        }
    }

    #[async_trait]
    impl TrustedDeviceRegistry for Fake {
        async fn fetch_trusted_devices(
            &self,
            _user: &UserId,
        ) -> Result<PairedDeviceSet, FetchFailed> {
            Err(FetchFailed)
        }
    }

    impl LockScreenBridge for Fake {
        fn apply(&self, command: LockScreenCommand) {
            self.push(format!("{command:?}"));
        }

        fn record_metric(&self, metric: Metric) {
            self.push(format!("{metric:?}"));
        }
    }

    #[async_trait]
    impl RadioAdapter for Fake {
        async fn discover(&self) -> Option<bool> {
            *self.radio_present.lock().unwrap()
        }
    }

    #[async_trait]
    impl RemoteToggle for Fake {
        async fn turn_off(&self) -> bool {
            self.push("turn-off");
            true
        }
    }

    #[derive(Clone, Default)]
    struct TurnOffLog(Arc<Mutex<Vec<TurnOffFlowStatus>>>);

    impl ServiceObserver for TurnOffLog {
        fn on_turn_off_operation_status_changed(&mut self, status: TurnOffFlowStatus) {
            self.0.lock().unwrap().push(status);
        }
    }

    fn collaborators(fake: &Arc<Fake>) -> Collaborators {
        Collaborators {
            app: fake.clone(),
            keys: fake.clone(),
            registry: fake.clone(),
            lock_screen: fake.clone(),
            radio: fake.clone(),
            remote: fake.clone(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loads_app_once_radio_discovered() {
        let fake = Arc::new(Fake::default());
        *fake.radio_present.lock().unwrap() = Some(true);

        let service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        let (runtime, handle) = Runtime::new(SystemEnv, service, collaborators(&fake));
        let task = tokio::spawn(runtime.run());

        handle.send(ServiceEvent::ActiveUserChanged { user: Some(UserId::new("a@b.c")) }).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fake.log().contains(&"load".to_string()));
        assert!(fake.log().contains(&"user a@b.c".to_string()));

        let status = handle.status();
        assert!(status.app_loaded);
        assert_eq!(status.active_user, Some(UserId::new("a@b.c")));

        handle.send(ServiceEvent::Shutdown).unwrap();
        let service = task.await.unwrap();
        assert!(service.is_shut_down());
        assert!(handle.send(ServiceEvent::Tick).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_grace_deadline_fires_tick() {
        let fake = Arc::new(Fake::default());
        *fake.radio_present.lock().unwrap() = Some(true);

        let service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        let (runtime, handle) = Runtime::new(SystemEnv, service, collaborators(&fake));
        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.send(ServiceEvent::SuspendImminent).unwrap();
        handle.send(ServiceEvent::SuspendDone { sleep_duration: Duration::from_secs(2) }).unwrap();
        handle.send(ServiceEvent::RadioPresenceChanged { present: false }).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let disables_in_window = fake.log().iter().filter(|e| *e == "disable").count();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let disables_after = fake.log().iter().filter(|e| *e == "disable").count();
        assert_eq!(disables_after, disables_in_window + 1);

        handle.send(ServiceEvent::Shutdown).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_radio_adapter_never_loads() {
        let fake = Arc::new(Fake::default());
        let collaborators = Collaborators { radio: Arc::new(NoRadioAdapter), ..collaborators(&fake) };

        let service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        let (runtime, handle) = Runtime::new(SystemEnv, service, collaborators);
        let task = tokio::spawn(runtime.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.send(ServiceEvent::Shutdown).unwrap();
        let service = task.await.unwrap();
        assert!(!fake.log().contains(&"load".to_string()));
        assert!(!service.radio().is_present());
    }

    #[tokio::test(start_paused = true)]
    async fn turn_off_request_reaches_remote() {
        let fake = Arc::new(Fake::default());
        *fake.radio_present.lock().unwrap() = Some(true);
        let observed = TurnOffLog::default();

        let service = UnlockService::<MemoryPreferences>::new(ServiceConfig::default(), None);
        let (mut runtime, handle) = Runtime::new(SystemEnv, service, collaborators(&fake));
        runtime.service_mut().add_observer(Box::new(observed.clone()));
        let task = tokio::spawn(runtime.run());

        let phone = RemoteDevice {
            bluetooth_address: String::new(),
            public_key: vec![1],
            psk: DeviceId::new("phone"),
        };
        handle.send(ServiceEvent::ActiveUserChanged { user: Some(UserId::new("a@b.c")) }).unwrap();
        handle.send(ServiceEvent::RemoteDevicesChanged { devices: Some(vec![phone]) }).unwrap();
        handle.send(ServiceEvent::TurnOffRequested).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fake.log().contains(&"turn-off".to_string()));
        assert!(fake.log().contains(&"reload".to_string()));
        assert!(!handle.status().enabled);
        assert_eq!(handle.status().turn_off, TurnOffFlowStatus::Idle);
        assert_eq!(
            *observed.0.lock().unwrap(),
            vec![TurnOffFlowStatus::Pending, TurnOffFlowStatus::Idle]
        );

        handle.send(ServiceEvent::Shutdown).unwrap();
        task.await.unwrap();
    }
}
