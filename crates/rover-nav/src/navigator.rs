//! Wall avoidance.
//!
//! [`NavigationState`] is the pure transition; [`Navigator`] wraps it as a
//! [`MessageObserver`] and turns each [`Maneuver`] into a burst of steering
//! commands on a [`CommandSink`].
//!
//! A burst runs as its own task so dispatch never waits on it. Readings that
//! arrive while a burst is still sending update the avoidance memory but do
//! not start another one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rover_core::{Command, Direction, ObserverError, SessionError, Telemetry};
use rover_session::{CommandSink, MessageObserver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the navigator decided to do for one reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Maneuver {
    /// Turn in place, then drive forward.
    Avoid(Direction),
}

/// Avoidance memory owned by one navigator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavigationState {
    last_turn: Option<Direction>,
    avoidance_forced: bool,
    active_turn: Option<Direction>,
}

impl NavigationState {
    /// State with a previously taken turn.
    pub fn with_last_turn(direction: Direction) -> Self {
        Self {
            last_turn: Some(direction),
            ..Self::default()
        }
    }

    /// Direction of the last completed avoidance.
    pub fn last_turn(&self) -> Option<Direction> {
        self.last_turn
    }

    /// Whether an avoidance is in progress.
    pub fn avoidance_forced(&self) -> bool {
        self.avoidance_forced
    }

    /// Direction of the avoidance in progress.
    pub fn active_turn(&self) -> Option<Direction> {
        self.active_turn
    }

    /// Feed one reading.
    ///
    /// While an avoidance is forced the turn direction is not re-evaluated.
    /// Once the reading clears `threshold` the turn taken becomes `last_turn`.
    pub fn observe(&mut self, distance: f64, threshold: f64) -> Option<Maneuver> {
        if distance < threshold {
            let direction = match self.active_turn {
                Some(active) if self.avoidance_forced => active,
                _ => {
                    let direction = self.last_turn.map_or(Direction::Right, Direction::opposite);
                    self.avoidance_forced = true;
                    self.active_turn = Some(direction);
                    direction
                }
            };
            return Some(Maneuver::Avoid(direction));
        }

        if self.avoidance_forced {
            self.last_turn = self.active_turn.take();
            self.avoidance_forced = false;
        }
        None
    }
}

/// Tuning for [`Navigator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavigatorConfig {
    /// Readings strictly below this trigger avoidance.
    pub wall_threshold: f64,
    /// Turn commands per burst.
    pub turn_repeats: u32,
    /// Forward commands after the turn.
    pub forward_repeats: u32,
    /// Spacing between commands in a burst.
    pub repeat_interval: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            wall_threshold: 20.0,
            turn_repeats: 10,
            forward_repeats: 10,
            repeat_interval: Duration::from_millis(100),
        }
    }
}

/// Avoidance observer.
pub struct Navigator {
    config: NavigatorConfig,
    state: Mutex<NavigationState>,
    sink: Arc<dyn CommandSink>,
    burst: Mutex<Option<JoinHandle<()>>>,
}

impl Navigator {
    /// Navigator with empty state.
    pub fn new(config: NavigatorConfig, sink: Arc<dyn CommandSink>) -> Self {
        Self::with_state(config, NavigationState::default(), sink)
    }

    /// Navigator resuming from `state`.
    pub fn with_state(
        config: NavigatorConfig,
        state: NavigationState,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(state),
            sink,
            burst: Mutex::new(None),
        }
    }

    /// Snapshot of the avoidance memory.
    pub fn state(&self) -> NavigationState {
        *self.state.lock()
    }

    /// Whether a burst is still sending.
    pub fn is_maneuvering(&self) -> bool {
        self.burst
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abort the burst in flight, if any.
    pub fn halt(&self) {
        if let Some(handle) = self.burst.lock().take() {
            handle.abort();
        }
    }

    fn execute(&self, maneuver: Maneuver) -> Result<(), ObserverError> {
        let Maneuver::Avoid(direction) = maneuver;
        let mut slot = self.burst.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(%direction, "burst in progress, reading absorbed");
            return Ok(());
        }
        if !self.sink.is_open() {
            return Err(ObserverError::new(format!(
                "cannot turn {direction}: session is closed"
            )));
        }

        info!(%direction, "wall ahead, turning");
        *slot = Some(tokio::spawn(run_burst(
            Arc::clone(&self.sink),
            self.config,
            direction,
        )));
        Ok(())
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Turn, then drive forward. Stops at the first send failure.
async fn run_burst(sink: Arc<dyn CommandSink>, config: NavigatorConfig, direction: Direction) {
    let steps = [
        (direction, config.turn_repeats),
        (Direction::Forward, config.forward_repeats),
    ];
    for (step, repeats) in steps {
        if let Err(error) = send_repeated(sink.as_ref(), step, repeats, config.repeat_interval).await
        {
            warn!(%direction, %error, "avoidance burst cut short");
            return;
        }
    }
    debug!(%direction, "avoidance burst finished");
}

async fn send_repeated(
    sink: &dyn CommandSink,
    direction: Direction,
    repeats: u32,
    interval: Duration,
) -> Result<(), SessionError> {
    for _ in 0..repeats {
        sink.send(Command::steer(direction)).await?;
        tokio::time::sleep(interval).await;
    }
    Ok(())
}

#[async_trait]
impl MessageObserver for Navigator {
    fn name(&self) -> &str {
        "navigator"
    }

    async fn on_message(&self, message: &Telemetry) -> Result<(), ObserverError> {
        let Some(distance) = message.distance else {
            return Ok(());
        };
        let maneuver = self.state.lock().observe(distance, self.config.wall_threshold);
        match maneuver {
            Some(maneuver) => self.execute(maneuver),
            None => {
                debug!(distance, "path clear");
                Ok(())
            }
        }
    }
}
