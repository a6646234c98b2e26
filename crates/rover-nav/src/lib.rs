//! # rover-nav
//!
//! Consumers of the rover link:
//!
//! - [`Navigator`]: wall avoidance driven by distance telemetry
//! - [`DriveLoop`]: periodic manual drive commands with a dead-reckoned pose
//! - [`MineMap`]: pose and mine markers fed by telemetry and the operator

#![deny(unsafe_code)]

pub mod drive;
pub mod mine_map;
pub mod navigator;

#[cfg(test)]
pub(crate) mod test_support;

pub use drive::{DriveConfig, DriveLoop, MIN_COMMAND_INTERVAL};
pub use mine_map::{MineMap, Pose};
pub use navigator::{Maneuver, NavigationState, Navigator, NavigatorConfig};
