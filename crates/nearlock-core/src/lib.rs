//! Nearlock core logic
//!
//! Pure state machines deciding whether a user may be unlocked (or signed in)
//! through a paired companion device, and what the lock screen must show at
//! every moment.
//!
//! # Architecture
//!
//! Every component in this crate is isolated from I/O, clocks and scheduling.
//! Inputs arrive as [`ServiceEvent`]s or method calls carrying an explicit
//! `now`, and every external effect is returned as a [`ServiceAction`] for a
//! runtime or test harness to execute. Completions of asynchronous work
//! (radio discovery, registry fetches, key preparation) come back as events
//! tagged with the [`RequestId`] they were issued under, so replies for a
//! superseded user or a shut down service are dropped by identity check.
//!
//! # Components
//!
//! - [`hardlock`]: persisted per-user hardlock state
//! - [`prefs`]: preference store abstraction and user settings
//! - [`radio`]: radio adapter presence monitor
//! - [`power`]: suspend/resume monitor with the wake grace window
//! - [`pairing`]: paired device sets and drift classification
//! - [`attempt`]: a single unlock or sign-in attempt
//! - [`screenlock`]: lock screen presentation state machine
//! - [`service`]: the orchestrating [`UnlockService`]
//! - [`mod@env`]: environment abstraction (time)

pub mod action;
pub mod attempt;
pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod hardlock;
pub mod metrics;
pub mod observer;
pub mod pairing;
pub mod power;
pub mod prefs;
pub mod radio;
pub mod screenlock;
pub mod service;
pub mod types;

pub use action::ServiceAction;
pub use attempt::{AttemptContext, AttemptKind, AttemptOutcome, AttemptState, AuthAttempt};
pub use config::{DEFAULT_WAKE_GRACE, ServiceConfig, ServiceKind};
pub use env::Environment;
pub use error::{AttemptError, StorageError};
pub use event::ServiceEvent;
pub use hardlock::{HardlockState, HardlockStore};
pub use metrics::{Metric, PasswordAuthEvent, TrialRunEvent};
pub use observer::{AppState, ObserverId, ServiceObserver, TurnOffFlowStatus};
pub use pairing::{FetchFailed, PairedDeviceSet, RemoteDevice};
pub use power::PowerStateMonitor;
pub use prefs::{MemoryPreferences, PrefDict, PrefValue, PreferenceStore, UserSettings};
pub use radio::{RadioAdapterMonitor, RadioState};
pub use screenlock::{
    AuthType, LockIcon, LockScreenCommand, Presentation, ScreenlockState,
    ScreenlockStateController, Tooltip,
};
pub use service::{ServiceStatus, UnlockService};
pub use types::{DeviceId, RequestId, UserId};
