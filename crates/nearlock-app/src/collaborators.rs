//! Platform collaborators.
//!
//! The runtime reaches everything outside the state machine through these
//! traits. Fire-and-forget calls are synchronous; anything with a completion
//! is async and its result is posted back to the service as an event.

use std::sync::Arc;

use async_trait::async_trait;
use nearlock_core::{FetchFailed, LockScreenCommand, Metric, PairedDeviceSet, UserId};

/// Companion application lifecycle.
#[async_trait]
pub trait CompanionApp: Send + Sync {
    /// Resolve once the app manager can accept commands.
    async fn ensure_ready(&self);

    /// Load and enable the app.
    fn load_app(&self);

    /// Disable the app if it is loaded.
    fn disable_app_if_loaded(&self);

    /// Reload the app.
    fn reload_app(&self);

    /// Open the setup flow.
    fn launch_setup(&self);

    /// Tell the app about the active user.
    fn send_user_updated(&self, user: &UserId, logged_in: bool, data_ready: bool);

    /// Tell the app an authentication attempt started.
    fn send_auth_attempt(&self, user: &UserId);
}

/// Secure key material preparation.
#[async_trait]
pub trait KeyPreparer: Send + Sync {
    /// Prepare the key, optionally verifying the private half.
    async fn prepare_key(&self, check_private_key: bool);
}

/// Authoritative store of a user's trusted devices.
#[async_trait]
pub trait TrustedDeviceRegistry: Send + Sync {
    /// Fetch the trusted device fingerprints of `user`.
    async fn fetch_trusted_devices(&self, user: &UserId) -> Result<PairedDeviceSet, FetchFailed>;
}

/// Lock screen UI and telemetry sink.
pub trait LockScreenBridge: Send + Sync {
    /// Apply a presentation command.
    fn apply(&self, command: LockScreenCommand);

    /// Record a telemetry sample.
    fn record_metric(&self, metric: Metric);
}

/// Local radio adapter.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Look up the adapter. `None` means the platform has no adapter
    /// subsystem at all.
    async fn discover(&self) -> Option<bool>;
}

/// Radio adapter for platforms without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRadioAdapter;

#[async_trait]
impl RadioAdapter for NoRadioAdapter {
    async fn discover(&self) -> Option<bool> {
        None
    }
}

/// Endpoint turning proximity unlock off on the remote side.
#[async_trait]
pub trait RemoteToggle: Send + Sync {
    /// Ask the remote to turn the feature off. Returns whether it accepted.
    async fn turn_off(&self) -> bool;
}

/// Every collaborator the runtime talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Companion app lifecycle.
    pub app: Arc<dyn CompanionApp>,
    /// Key preparation.
    pub keys: Arc<dyn KeyPreparer>,
    /// Trusted device registry.
    pub registry: Arc<dyn TrustedDeviceRegistry>,
    /// Lock screen and telemetry sink.
    pub lock_screen: Arc<dyn LockScreenBridge>,
    /// Radio adapter.
    pub radio: Arc<dyn RadioAdapter>,
    /// Remote turn-off endpoint.
    pub remote: Arc<dyn RemoteToggle>,
}
