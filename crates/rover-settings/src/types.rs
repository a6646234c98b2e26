//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`
//! so a partial file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoverSettings {
    /// Where the onboard controller listens.
    pub controller: ControllerSettings,
    /// Obstacle-avoidance tuning.
    pub navigation: NavigationSettings,
    /// Manual drive loop tuning.
    pub drive: DriveSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RoverSettings {
    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.controller.host.trim().is_empty() {
            return invalid("controller.host must not be empty");
        }
        if self.controller.port == 0 {
            return invalid("controller.port must be non-zero");
        }
        let threshold = self.navigation.wall_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return invalid(format!(
                "navigation.wallThreshold must be positive, got {threshold}"
            ));
        }
        if self.navigation.repeat_interval_ms == 0 {
            return invalid("navigation.repeatIntervalMs must be non-zero");
        }
        if self.drive.command_interval_ms == 0 {
            return invalid("drive.commandIntervalMs must be non-zero");
        }
        for (name, value) in [
            ("drive.robotSpeed", self.drive.robot_speed),
            ("drive.rotationSpeed", self.drive.rotation_speed),
            ("drive.mapHalfExtent", self.drive.map_half_extent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<()> {
    Err(SettingsError::InvalidValue(message.into()))
}

/// Controller endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerSettings {
    /// Hostname or IP of the controller's access point.
    pub host: String,
    /// WebSocket server port.
    pub port: u16,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".into(),
            port: 81,
        }
    }
}

/// Obstacle avoidance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationSettings {
    /// Readings strictly below this trigger avoidance.
    pub wall_threshold: f64,
    /// Turn commands per avoidance burst.
    pub turn_repeats: u32,
    /// Forward commands after the turn.
    pub forward_repeats: u32,
    /// Spacing between burst commands.
    pub repeat_interval_ms: u64,
}

impl NavigationSettings {
    /// Spacing as a [`Duration`].
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            wall_threshold: 20.0,
            turn_repeats: 10,
            forward_repeats: 10,
            repeat_interval_ms: 100,
        }
    }
}

/// Manual drive loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveSettings {
    /// Tick between drive commands.
    pub command_interval_ms: u64,
    /// Linear speed used for the pose estimate, m/s.
    pub robot_speed: f64,
    /// Angular speed used for the pose estimate, rad/s.
    pub rotation_speed: f64,
    /// Pose is clamped to `[-extent, extent]` on both axes.
    pub map_half_extent: f64,
}

impl DriveSettings {
    /// Tick as a [`Duration`].
    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            command_interval_ms: 50,
            robot_speed: 0.75,
            rotation_speed: 0.75,
            map_half_extent: 2.0,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
