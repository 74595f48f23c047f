//! One-line status rendering.

use nearlock_core::{RadioState, ServiceStatus, UserId};

/// Render a status snapshot as a single line.
pub fn status_line(status: &ServiceStatus) -> String {
    let user = status.active_user.as_ref().map_or("-", UserId::as_str);
    let radio = match status.radio {
        RadioState::Uninitialized => "uninitialized",
        RadioState::Discovering => "discovering",
        RadioState::Unavailable => "unavailable",
        RadioState::Discovered { present: true } => "present",
        RadioState::Discovered { present: false } => "absent",
    };
    let screen = match status.screenlock {
        Some(state) => format!("{state:?}"),
        None => "-".to_string(),
    };

    format!(
        "user={user} allowed={} enabled={} app={} radio={radio} screen={} lock-ui={screen} hardlock={:?} turn-off={:?}",
        yes_no(status.allowed),
        yes_no(status.enabled),
        if status.app_loaded { "loaded" } else { "disabled" },
        if status.screen_locked { "locked" } else { "unlocked" },
        status.hardlock,
        status.turn_off,
    )
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
