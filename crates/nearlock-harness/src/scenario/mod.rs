//! Scenario testing with mandatory oracles.
//!
//! A scenario is a scripted sequence of events, clock advances and reply
//! deliveries against a [`SimWorld`]. It cannot run without an oracle that
//! checks the final world.

mod builder;
pub mod oracle;

pub use builder::{RunnableScenario, Scenario};

use crate::world::SimWorld;

/// Verification run against the world. `Err` carries the reason.
pub type OracleFn = Box<dyn Fn(&SimWorld) -> Result<(), String>>;
