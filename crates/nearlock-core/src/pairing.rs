//! Paired devices and drift classification.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::{hardlock::HardlockState, types::DeviceId};

/// Set of paired device fingerprints.
pub type PairedDeviceSet = BTreeSet<DeviceId>;

/// A companion device enrolled for proximity unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    /// Radio address of the device.
    pub bluetooth_address: String,
    /// Public key the device authenticates with.
    pub public_key: Vec<u8>,
    /// Pre-shared key fingerprint identifying the pairing.
    pub psk: DeviceId,
}

/// The trusted device registry could not answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("trusted device fetch failed")]
pub struct FetchFailed;

/// Fingerprints of a remote device list. Unknown lists yield an empty set.
pub fn paired_device_set(devices: Option<&[RemoteDevice]>) -> PairedDeviceSet {
    devices.unwrap_or_default().iter().map(|device| device.psk.clone()).collect()
}

/// Classify the registry's answer against the locally known set.
///
/// Returns the hardlock state to apply, or `None` when the sets agree.
pub fn drift_hardlock(
    local: &PairedDeviceSet,
    fetched: Result<&PairedDeviceSet, FetchFailed>,
) -> Option<HardlockState> {
    match fetched {
        Err(FetchFailed) => Some(HardlockState::NoPairing),
        Ok(remote) if remote == local => None,
        Ok(remote) if remote.is_empty() => Some(HardlockState::PairingAdded),
        Ok(_) => Some(HardlockState::PairingChanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> PairedDeviceSet {
        ids.iter().map(|id| DeviceId::from(*id)).collect()
    }

    #[test]
    fn device_set_from_list() {
        let devices = vec![RemoteDevice {
            bluetooth_address: "00:11:22:33:44:55".into(),
            public_key: vec![1, 2, 3],
            psk: DeviceId::from("psk-1"),
        }];
        assert_eq!(paired_device_set(Some(&devices)), set(&["psk-1"]));
        assert!(paired_device_set(None).is_empty());
    }

    #[test]
    fn drift_classification() {
        let local = set(&["a"]);
        assert_eq!(drift_hardlock(&local, Err(FetchFailed)), Some(HardlockState::NoPairing));
        assert_eq!(drift_hardlock(&local, Ok(&set(&["a"]))), None);
        assert_eq!(drift_hardlock(&local, Ok(&set(&[]))), Some(HardlockState::PairingAdded));
        assert_eq!(drift_hardlock(&local, Ok(&set(&["b"]))), Some(HardlockState::PairingChanged));
        assert_eq!(
            drift_hardlock(&local, Ok(&set(&["a", "b"]))),
            Some(HardlockState::PairingChanged)
        );
    }
}
