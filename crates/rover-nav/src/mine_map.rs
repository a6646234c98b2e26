//! Headless model of the operator's map: robot pose and mine markers.

use std::f64::consts::TAU;

use async_trait::async_trait;
use parking_lot::Mutex;
use rover_core::{Direction, ObserverError, Telemetry};
use rover_session::MessageObserver;
use tracing::info;

/// Markers closer than this (metres) are treated as the same mine.
const MIN_MARKER_SPACING: f64 = 0.05;

/// Estimated robot pose. Heading is in radians, counter-clockwise from +x.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// X position, metres.
    pub x: f64,
    /// Y position, metres.
    pub y: f64,
    /// Heading in `[0, 2π)`.
    pub heading: f64,
}

impl Pose {
    /// Dead-reckon one step of `seconds` while `direction` is held.
    ///
    /// Position is clamped to `[-extent, extent]` on both axes.
    #[must_use]
    pub fn advance(
        self,
        direction: Direction,
        seconds: f64,
        speed: f64,
        rotation_speed: f64,
        extent: f64,
    ) -> Self {
        let step = speed * seconds;
        let (dx, dy) = (self.heading.cos() * step, self.heading.sin() * step);
        let mut next = self;
        match direction {
            Direction::Forward => {
                next.x += dx;
                next.y += dy;
            }
            Direction::Backward => {
                next.x -= dx;
                next.y -= dy;
            }
            Direction::Left => next.heading += rotation_speed * seconds,
            Direction::Right => next.heading -= rotation_speed * seconds,
            Direction::None => {}
        }
        next.x = next.x.clamp(-extent, extent);
        next.y = next.y.clamp(-extent, extent);
        next.heading = next.heading.rem_euclid(TAU);
        next
    }
}

#[derive(Default)]
struct MapInner {
    pose: Pose,
    mines: Vec<(f64, f64)>,
}

/// Pose and mine markers, shared between telemetry and the operator.
#[derive(Default)]
pub struct MineMap {
    inner: Mutex<MapInner>,
}

impl MineMap {
    /// Empty map with the robot at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pose.
    pub fn pose(&self) -> Pose {
        self.inner.lock().pose
    }

    /// Replace the pose.
    pub fn set_pose(&self, pose: Pose) {
        self.inner.lock().pose = pose;
    }

    /// Apply `f` to the pose atomically and return the new value.
    pub fn update_pose(&self, f: impl FnOnce(Pose) -> Pose) -> Pose {
        let mut inner = self.inner.lock();
        inner.pose = f(inner.pose);
        inner.pose
    }

    /// Marker positions in insertion order.
    pub fn mines(&self) -> Vec<(f64, f64)> {
        self.inner.lock().mines.clone()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.inner.lock().mines.len()
    }

    /// Whether no marker has been placed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a marker at `(x, y)`. Returns `false` if one already lies
    /// within 5 cm.
    pub fn mark(&self, x: f64, y: f64) -> bool {
        let mut inner = self.inner.lock();
        let duplicate = inner
            .mines
            .iter()
            .any(|&(mx, my)| (mx - x).hypot(my - y) < MIN_MARKER_SPACING);
        if duplicate {
            return false;
        }
        inner.mines.push((x, y));
        info!(x, y, total = inner.mines.len(), "mine marked");
        true
    }

    /// Record a marker at the current pose.
    pub fn mark_at_pose(&self) -> bool {
        let Pose { x, y, .. } = self.pose();
        self.mark(x, y)
    }
}

#[async_trait]
impl MessageObserver for MineMap {
    fn name(&self) -> &str {
        "mine-map"
    }

    async fn on_message(&self, message: &Telemetry) -> Result<(), ObserverError> {
        if let Some((x, y)) = message.position() {
            let _ = self.update_pose(|pose| Pose { x, y, ..pose });
        }
        if message.mine_detected() {
            let _ = self.mark_at_pose();
        }
        Ok(())
    }
}
