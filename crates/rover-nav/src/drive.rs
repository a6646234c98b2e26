//! Manual teleoperation loop.
//!
//! Every tick the held direction (or `none`) is sent as a drive command and
//! the pose on the shared [`MineMap`] is advanced by dead reckoning.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rover_core::{Command, Direction};
use rover_session::CommandSink;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::mine_map::{MineMap, Pose};

/// Shortest tick the loop will run at.
pub const MIN_COMMAND_INTERVAL: Duration = Duration::from_millis(1);

/// Drive loop tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriveConfig {
    /// Tick period.
    pub command_interval: Duration,
    /// Linear speed, m/s.
    pub robot_speed: f64,
    /// Angular speed, rad/s.
    pub rotation_speed: f64,
    /// Pose clamp on both axes.
    pub map_half_extent: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            command_interval: Duration::from_millis(50),
            robot_speed: 0.75,
            rotation_speed: 0.75,
            map_half_extent: 2.0,
        }
    }
}

/// Periodic drive command sender.
pub struct DriveLoop {
    config: DriveConfig,
    sink: Arc<dyn CommandSink>,
    map: Arc<MineMap>,
    held: Mutex<Direction>,
}

impl DriveLoop {
    /// Create a loop with nothing held.
    ///
    /// A `command_interval` below [`MIN_COMMAND_INTERVAL`] is raised to it.
    pub fn new(mut config: DriveConfig, sink: Arc<dyn CommandSink>, map: Arc<MineMap>) -> Self {
        if config.command_interval < MIN_COMMAND_INTERVAL {
            warn!(interval = ?config.command_interval, "drive interval too short, clamping");
            config.command_interval = MIN_COMMAND_INTERVAL;
        }
        Self {
            config,
            sink,
            map,
            held: Mutex::new(Direction::None),
        }
    }

    /// Start holding `direction`.
    pub fn hold(&self, direction: Direction) {
        *self.held.lock() = direction;
    }

    /// Release whatever is held.
    pub fn release(&self) {
        self.hold(Direction::None);
    }

    /// Currently held direction.
    pub fn held(&self) -> Direction {
        *self.held.lock()
    }

    /// Advance the pose by one tick and return the direction to send.
    pub fn step(&self) -> (Direction, Pose) {
        let direction = self.held();
        let c = self.config;
        let pose = self.map.update_pose(|pose| {
            pose.advance(
                direction,
                c.command_interval.as_secs_f64(),
                c.robot_speed,
                c.rotation_speed,
                c.map_half_extent,
            )
        });
        (direction, pose)
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.command_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (direction, pose) = self.step();
            if direction != Direction::None {
                debug!(%direction, x = pose.x, y = pose.y, heading = pose.heading, "drive tick");
            }
            if !self.sink.is_open() {
                continue;
            }
            if let Err(error) = self.sink.send(Command::drive(direction)).await {
                warn!(%error, "drive command not sent");
            }
        }
        debug!("drive loop stopped");
    }
}
