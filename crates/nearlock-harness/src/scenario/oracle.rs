//! Reusable oracles.
//!
//! Each helper returns an [`OracleFn`]; combine them with [`all_of`].

use nearlock_core::{HardlockState, LockIcon, Metric, ScreenlockStateController, UserId};

use crate::{scenario::OracleFn, world::SimWorld};

/// Pass when `predicate` holds for the world.
pub fn check(what: &'static str, predicate: impl Fn(&SimWorld) -> bool + 'static) -> OracleFn {
    Box::new(move |world| {
        if predicate(world) { Ok(()) } else { Err(format!("check failed: {what}")) }
    })
}

/// Pass only if every oracle passes. Reports the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| oracles.iter().try_for_each(|oracle| oracle(world)))
}

/// The companion app is loaded, both in the service and in the fake.
pub fn app_loaded() -> OracleFn {
    Box::new(|world| {
        if world.service().is_app_loaded() && world.app_loaded() {
            Ok(())
        } else {
            Err(format!(
                "expected app loaded (service: {}, fake: {})",
                world.service().is_app_loaded(),
                world.app_loaded()
            ))
        }
    })
}

/// The companion app is not loaded, both in the service and in the fake.
pub fn app_not_loaded() -> OracleFn {
    Box::new(|world| {
        if !world.service().is_app_loaded() && !world.app_loaded() {
            Ok(())
        } else {
            Err(format!(
                "expected app not loaded (service: {}, fake: {})",
                world.service().is_app_loaded(),
                world.app_loaded()
            ))
        }
    })
}

/// The fake app was disabled exactly `count` times.
pub fn app_disables(count: usize) -> OracleFn {
    Box::new(move |world| expect_eq("app disables", world.app_disables(), count))
}

/// Whether the feature is allowed.
pub fn allowed(expected: bool) -> OracleFn {
    Box::new(move |world| expect_eq("allowed", world.service().is_allowed(), expected))
}

/// Whether the feature is enabled for the active user.
pub fn enabled(expected: bool) -> OracleFn {
    Box::new(move |world| expect_eq("enabled", world.service().is_enabled(), expected))
}

/// Hardlock state of the active user as the service reports it.
pub fn hardlock(expected: HardlockState) -> OracleFn {
    Box::new(move |world| expect_eq("hardlock", world.service().hardlock_state(), expected))
}

/// Hardlock state persisted for `user`. `None` means nothing stored.
pub fn persisted_hardlock(user: &str, expected: Option<HardlockState>) -> OracleFn {
    let user = UserId::from(user);
    Box::new(move |world| {
        expect_eq(&format!("persisted hardlock of {user}"), world.persisted_hardlock(&user), expected)
    })
}

/// Hardlock state held by the lock screen controller.
pub fn screen_hardlock(expected: HardlockState) -> OracleFn {
    Box::new(move |world| {
        let actual = world.service().screenlock().map(ScreenlockStateController::hardlock_state);
        expect_eq("lock screen hardlock", actual, Some(expected))
    })
}

/// Icon currently shown on the lock screen.
pub fn shown_icon(expected: Option<LockIcon>) -> OracleFn {
    Box::new(move |world| expect_eq("shown icon", world.shown_icon(), expected))
}

/// No authentication attempt is in flight.
pub fn no_attempt() -> OracleFn {
    Box::new(|world| match world.service().attempt() {
        None => Ok(()),
        Some(attempt) => Err(format!("attempt still in flight: {attempt:?}")),
    })
}

/// Exactly `count` recorded metrics match `filter`.
pub fn metric_count(filter: fn(&Metric) -> bool, count: usize) -> OracleFn {
    Box::new(move |world| {
        let actual = world.metrics().iter().filter(|metric| filter(metric)).count();
        expect_eq("matching metrics", actual, count)
    })
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(
    what: &str,
    actual: T,
    expected: T,
) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}

#[cfg(test)]
mod tests {
    use nearlock_core::ServiceConfig;

    use super::*;

    #[test]
    fn all_of_reports_first_failure() {
        let world = SimWorld::new(ServiceConfig::default());
        let pass: OracleFn = Box::new(|_| Ok(()));
        let first: OracleFn = Box::new(|_| Err("first".into()));
        let second: OracleFn = Box::new(|_| Err("second".into()));
        let oracle = all_of(vec![pass, first, second]);
        assert_eq!(oracle(&world), Err("first".to_string()));
    }

    #[test]
    fn check_names_failed_predicate() {
        let world = SimWorld::new(ServiceConfig::default());
        let oracle = check("app loaded", SimWorld::app_loaded);
        assert_eq!(oracle(&world), Err("check failed: app loaded".to_string()));
    }

    #[test]
    fn fresh_world_is_idle() {
        let world = SimWorld::new(ServiceConfig::default());
        let oracle = all_of(vec![app_not_loaded(), allowed(false), no_attempt()]);
        assert_eq!(oracle(&world), Ok(()));
    }
}
