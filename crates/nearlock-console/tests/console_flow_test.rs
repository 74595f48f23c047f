//! Console commands driving a live runtime with logging collaborators.

use std::time::Duration;

use nearlock_app::{Runtime, RuntimeHandle, SystemEnv};
use nearlock_console::{ConsoleCollaborators, parse};
use nearlock_core::{
    HardlockState, MemoryPreferences, ServiceConfig, ServiceEvent, TurnOffFlowStatus,
    UnlockService, UserId,
};

fn start(radio: Option<bool>) -> (ConsoleCollaborators, RuntimeHandle) {
    let console = ConsoleCollaborators::new(radio);
    let service = UnlockService::<MemoryPreferences>::new(
        ServiceConfig::default(),
        Some(MemoryPreferences::new()),
    );
    let (runtime, handle) = Runtime::new(SystemEnv, service, console.collaborators());
    tokio::spawn(runtime.run());
    (console, handle)
}

async fn type_line(handle: &RuntimeHandle, line: &str) {
    let active_user = handle.status().active_user;
    let event = parse(line).into_event(active_user.as_ref()).unwrap();
    handle.send(event).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn user_and_pairing_commands() {
    let (_console, handle) = start(Some(true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    type_line(&handle, "/user alice@example.com").await;
    type_line(&handle, "/pair phone").await;

    let status = handle.status();
    assert!(status.allowed);
    assert!(status.enabled);
    assert!(status.app_loaded);
    assert_eq!(status.active_user, Some(UserId::new("alice@example.com")));
}

#[tokio::test(start_paused = true)]
async fn registry_drift_from_console() {
    let (console, handle) = start(Some(true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    type_line(&handle, "/user alice@example.com").await;
    type_line(&handle, "/pair phone").await;
    console.set_trusted(Some(["tablet"]));
    type_line(&handle, "/check").await;

    assert_eq!(handle.status().hardlock, HardlockState::PairingChanged);
}

#[tokio::test(start_paused = true)]
async fn turn_off_clears_pairing() {
    let (_console, handle) = start(Some(true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    type_line(&handle, "/user alice@example.com").await;
    type_line(&handle, "/pair phone").await;
    assert!(handle.status().enabled);

    type_line(&handle, "/turnoff").await;
    let status = handle.status();
    assert!(!status.enabled);
    assert_eq!(status.turn_off, TurnOffFlowStatus::Idle);
    assert!(status.app_loaded);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_no_pairing() {
    let (_console, handle) = start(Some(true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    type_line(&handle, "/user alice@example.com").await;
    type_line(&handle, "/pair phone").await;
    type_line(&handle, "/check").await;

    assert_eq!(handle.status().hardlock, HardlockState::NoPairing);
}

#[tokio::test(start_paused = true)]
async fn radio_toggle_updates_status() {
    let (_console, handle) = start(Some(true));
    tokio::time::sleep(Duration::from_millis(10)).await;
    type_line(&handle, "/user alice@example.com").await;

    type_line(&handle, "/radio off").await;
    assert!(!handle.status().allowed);
    assert!(!handle.status().app_loaded);

    type_line(&handle, "/radio on").await;
    assert!(handle.status().app_loaded);
}

#[tokio::test(start_paused = true)]
async fn no_radio_subsystem() {
    let (_console, mut handle) = start(None);
    tokio::time::sleep(Duration::from_millis(10)).await;
    type_line(&handle, "/user alice@example.com").await;

    assert!(!handle.status().allowed);
    handle.send(parse("/radio on").into_event(None).unwrap()).unwrap();
    handle.send(ServiceEvent::Shutdown).unwrap();
    while handle.changed().await.is_ok() {}
    assert!(!handle.status().allowed);
}
