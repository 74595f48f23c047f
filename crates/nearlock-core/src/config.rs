//! Service configuration.

use std::time::Duration;

/// How long radio absence is tolerated after the system resumes.
pub const DEFAULT_WAKE_GRACE: Duration = Duration::from_secs(5);

/// Which flavour of the service runs for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceKind {
    /// Signed-in session; attempts unlock the screen.
    #[default]
    Regular,
    /// Login screen; attempts sign the user in.
    Signin,
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Regular (unlock) or sign-in service.
    pub kind: ServiceKind,
    /// Grace window after resume during which radio absence is transient.
    pub wake_grace: Duration,
    /// Administrative kill switch for the whole feature.
    pub feature_disabled: bool,
    /// Initial verdict of the platform allow policy. Updated at runtime via
    /// [`crate::ServiceEvent::PolicyChanged`].
    pub policy_allowed: bool,
    /// Whether secure key preparation should verify the private key.
    pub check_private_key: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            kind: ServiceKind::Regular,
            wake_grace: DEFAULT_WAKE_GRACE,
            feature_disabled: false,
            policy_allowed: true,
            check_private_key: true,
        }
    }
}
