//! Wire message types exchanged with the onboard controller.
//!
//! Outbound traffic is a single [`Command`] per frame, either
//! `{"direction": ...}` (autopilot steering) or `{"cmd": ...}` (manual
//! drive). Inbound traffic is [`Telemetry`]: a JSON object whose known fields
//! are typed and whose unknown fields are kept verbatim in `extra`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::codec::WireMessage;
use crate::errors::CodecError;

// ─────────────────────────────────────────────────────────────────────────────
// Direction
// ─────────────────────────────────────────────────────────────────────────────

/// One drive intent understood by the controller firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Drive forward.
    Forward,
    /// Drive backward.
    Backward,
    /// Rotate counter-clockwise.
    Left,
    /// Rotate clockwise.
    Right,
    /// Stop / no key held.
    None,
}

impl Direction {
    /// Every direction, in wire order.
    pub const ALL: [Self; 5] = [
        Self::Forward,
        Self::Backward,
        Self::Left,
        Self::Right,
        Self::None,
    ];

    /// Wire spelling of this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::None => "none",
        }
    }

    /// The mirrored turn (`left` ↔ `right`); other directions map to themselves.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            other => other,
        }
    }

    /// Whether this is an in-place rotation.
    pub fn is_turn(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| CodecError::decoding(format!("unknown direction '{s}'")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// One outbound control intent.
///
/// The two variants differ only in the JSON key the firmware reads; the
/// autopilot historically used `direction` and the manual drive UI `cmd`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// `{"direction": <dir>}`
    Steer {
        /// Requested direction.
        direction: Direction,
    },
    /// `{"cmd": <dir>}`
    Drive {
        /// Requested direction.
        cmd: Direction,
    },
}

impl Command {
    /// Steering command as issued by the autopilot.
    pub fn steer(direction: Direction) -> Self {
        Self::Steer { direction }
    }

    /// Drive command as issued by the manual drive loop.
    pub fn drive(direction: Direction) -> Self {
        Self::Drive { cmd: direction }
    }

    /// The direction carried by this command.
    pub fn direction(&self) -> Direction {
        match *self {
            Self::Steer { direction } => direction,
            Self::Drive { cmd } => cmd,
        }
    }
}

impl WireMessage for Command {}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

/// One inbound telemetry object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Range-finder reading, in distance units (centimetres on the stock board).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Reported X position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Reported Y position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Mine detector state. The firmware sends `0`/`1`; booleans are accepted too.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "ser_flag",
        deserialize_with = "de_flag"
    )]
    pub mine: Option<bool>,
    /// Any other fields, preserved but otherwise ignored.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Telemetry {
    /// Telemetry carrying only a distance reading.
    pub fn with_distance(distance: f64) -> Self {
        Self {
            distance: Some(distance),
            ..Self::default()
        }
    }

    /// Reported `(x, y)` when both coordinates are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.x.zip(self.y)
    }

    /// Whether the detector flagged a mine in this frame.
    pub fn mine_detected(&self) -> bool {
        self.mine.unwrap_or(false)
    }
}

impl WireMessage for Telemetry {
    fn check(&self) -> Result<(), CodecError> {
        let fields = [("distance", self.distance), ("x", self.x), ("y", self.y)];
        for (name, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(CodecError::encoding(format!("{name} is not finite ({v})")));
                }
            }
        }
        Ok(())
    }
}

#[allow(clippy::ref_option)]
fn ser_flag<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(flag) => serializer.serialize_u8(u8::from(*flag)),
        None => serializer.serialize_none(),
    }
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    use serde::de::Error as _;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(D::Error::custom(format!("mine flag must be 0 or 1, got {n}"))),
        },
        Some(other) => Err(D::Error::custom(format!("invalid mine flag: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposites() {
        assert_eq!(Direction::Left.opposite(), Direction::Right);
        assert_eq!(Direction::Right.opposite(), Direction::Left);
        assert_eq!(Direction::Forward.opposite(), Direction::Forward);
        assert_eq!(Direction::None.opposite(), Direction::None);
    }

    #[test]
    fn direction_from_str() {
        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn direction_is_turn() {
        assert!(Direction::Left.is_turn());
        assert!(Direction::Right.is_turn());
        assert!(!Direction::Forward.is_turn());
        assert!(!Direction::None.is_turn());
    }

    #[test]
    fn steer_serializes_with_direction_key() {
        let json = serde_json::to_string(&Command::steer(Direction::Left)).unwrap();
        assert_eq!(json, r#"{"direction":"left"}"#);
    }

    #[test]
    fn drive_serializes_with_cmd_key() {
        let json = serde_json::to_string(&Command::drive(Direction::None)).unwrap();
        assert_eq!(json, r#"{"cmd":"none"}"#);
    }

    #[test]
    fn command_direction_accessor() {
        assert_eq!(Command::steer(Direction::Right).direction(), Direction::Right);
        assert_eq!(Command::drive(Direction::Backward).direction(), Direction::Backward);
    }

    #[test]
    fn telemetry_parses_firmware_frame() {
        let t: Telemetry = serde_json::from_str(r#"{"x":1.0, "y":0.5, "mine":1}"#).unwrap();
        assert_eq!(t.position(), Some((1.0, 0.5)));
        assert!(t.mine_detected());
        assert!(t.distance.is_none());
    }

    #[test]
    fn telemetry_accepts_bool_mine_flag() {
        let t: Telemetry = serde_json::from_str(r#"{"mine":false}"#).unwrap();
        assert_eq!(t.mine, Some(false));
    }

    #[test]
    fn telemetry_rejects_out_of_range_mine_flag() {
        assert!(serde_json::from_str::<Telemetry>(r#"{"mine":7}"#).is_err());
    }

    #[test]
    fn telemetry_keeps_unknown_fields() {
        let t: Telemetry =
            serde_json::from_str(r#"{"distance":42,"battery":7.4,"tag":"a"}"#).unwrap();
        assert_eq!(t.distance, Some(42.0));
        assert_eq!(t.extra["battery"], 7.4);
        assert_eq!(t.extra["tag"], "a");
    }

    #[test]
    fn telemetry_serializes_mine_as_number() {
        let t = Telemetry {
            mine: Some(true),
            ..Telemetry::default()
        };
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"mine":1}"#);
    }

    #[test]
    fn telemetry_check_rejects_nan() {
        let t = Telemetry::with_distance(f64::NAN);
        assert!(t.check().is_err());
        assert!(Telemetry::with_distance(12.0).check().is_ok());
    }
}
