//! Operator input for `rover drive`.

use rover_core::Direction;

/// One line of operator input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveInput {
    /// Keep sending this direction.
    Hold(Direction),
    /// Send `none`.
    Release,
    /// Drop a mine marker at the current pose.
    MarkMine,
    /// Leave drive mode.
    Quit,
}

impl DriveInput {
    /// Parse a line: `w`/`a`/`s`/`d` hold, `x` or blank release, `m` marks,
    /// `q` quits. Full direction names are accepted too.
    pub fn parse(line: &str) -> Option<Self> {
        let key = line.trim().to_ascii_lowercase();
        let input = match key.as_str() {
            "" | "x" => Self::Release,
            "w" => Self::Hold(Direction::Forward),
            "a" => Self::Hold(Direction::Left),
            "s" => Self::Hold(Direction::Backward),
            "d" => Self::Hold(Direction::Right),
            "m" => Self::MarkMine,
            "q" | "quit" | "exit" => Self::Quit,
            other => match other.parse::<Direction>() {
                Ok(Direction::None) => Self::Release,
                Ok(direction) => Self::Hold(direction),
                Err(_) => return None,
            },
        };
        Some(input)
    }
}
