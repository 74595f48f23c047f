//! Logging collaborators.
//!
//! Every platform call is logged instead of performed. The radio and the
//! trusted device registry answer from state the console user controls.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use nearlock_app::{
    Collaborators, CompanionApp, KeyPreparer, LockScreenBridge, RadioAdapter, RemoteToggle,
    TrustedDeviceRegistry,
};
use nearlock_core::{
    DeviceId, FetchFailed, LockScreenCommand, Metric, PairedDeviceSet, UserId,
};
use tracing::{info, warn};

#[derive(Debug)]
struct Answers {
    radio: Option<bool>,
    trusted: Option<PairedDeviceSet>,
}

/// Collaborators that log every call
#[derive(Debug, Clone)]
pub struct ConsoleCollaborators {
    answers: Arc<Mutex<Answers>>,
}

impl ConsoleCollaborators {
    /// Create collaborators. `radio` is what discovery reports; `None`
    /// means no adapter subsystem.
    pub fn new(radio: Option<bool>) -> Self {
        Self { answers: Arc::new(Mutex::new(Answers { radio, trusted: None })) }
    }

    /// Set the registry answer. `None` makes fetches fail.
    pub fn set_trusted<I, S>(&self, devices: Option<I>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trusted = devices.map(|devices| devices.into_iter().map(DeviceId::new).collect());
        self.answers.lock().unwrap_or_else(PoisonError::into_inner).trusted = trusted;
    }

    /// Bundle for [`nearlock_app::Runtime::new`].
    pub fn collaborators(&self) -> Collaborators {
        let shared = Arc::new(self.clone());
        Collaborators {
            app: shared.clone(),
            keys: shared.clone(),
            registry: shared.clone(),
            lock_screen: shared.clone(),
            radio: shared.clone(),
            remote: shared,
        }
    }
}

#[async_trait]
impl CompanionApp for ConsoleCollaborators {
    async fn ensure_ready(&self) {
        info!("app manager ready");
    }

    fn load_app(&self) {
        info!("load companion app");
    }

    fn disable_app_if_loaded(&self) {
        info!("disable companion app");
    }

    fn reload_app(&self) {
        info!("reload companion app");
    }

    fn launch_setup(&self) {
        info!("launch setup");
    }

    fn send_user_updated(&self, user: &UserId, logged_in: bool, data_ready: bool) {
        info!(%user, logged_in, data_ready, "user updated");
    }

    fn send_auth_attempt(&self, user: &UserId) {
        info!(%user, "auth attempt sent to companion");
    }
}

#[async_trait]
impl KeyPreparer for ConsoleCollaborators {
    async fn prepare_key(&self, check_private_key: bool) {
        info!(check_private_key, "secure key prepared");
    }
}

#[async_trait]
impl TrustedDeviceRegistry for ConsoleCollaborators {
    async fn fetch_trusted_devices(&self, user: &UserId) -> Result<PairedDeviceSet, FetchFailed> {
        let trusted = self.answers.lock().unwrap_or_else(PoisonError::into_inner).trusted.clone();
        match trusted {
            Some(devices) => {
                info!(%user, count = devices.len(), "trusted devices fetched");
                Ok(devices)
            },
            None => {
                warn!(%user, "trusted device fetch failed");
                Err(FetchFailed)
            },
        }
    }
}

impl LockScreenBridge for ConsoleCollaborators {
    fn apply(&self, command: LockScreenCommand) {
        info!(?command, "lock screen");
    }

    fn record_metric(&self, metric: Metric) {
        info!(?metric, "metric");
    }
}

#[async_trait]
impl RadioAdapter for ConsoleCollaborators {
    async fn discover(&self) -> Option<bool> {
        self.answers.lock().unwrap_or_else(PoisonError::into_inner).radio
    }
}

#[async_trait]
impl RemoteToggle for ConsoleCollaborators {
    async fn turn_off(&self) -> bool {
        info!("remote turn-off accepted");
        true
    }
}
