//! Motor commands and their text form on the serial link
//!
//! ```text
//! <channel>:<f|b|s>:<speed 0-255>\n
//! ```

use std::fmt;
use std::str::FromStr;

use crate::axis::Axis;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Stop,
}

impl Direction {
    pub fn as_char(self) -> char {
        match self {
            Direction::Forward => 'f',
            Direction::Backward => 'b',
            Direction::Stop => 's',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'f' => Some(Direction::Forward),
            'b' => Some(Direction::Backward),
            's' => Some(Direction::Stop),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Command {
    pub axis: Axis,
    pub direction: Direction,
    pub speed: u8,
}

impl Command {
    pub fn new(axis: Axis, direction: Direction, speed: u8) -> Self {
        Self {
            axis,
            direction,
            speed,
        }
    }

    pub fn stop(axis: Axis) -> Self {
        Self::new(axis, Direction::Stop, 0)
    }

    pub fn forward(axis: Axis, speed: u8) -> Self {
        Self::new(axis, Direction::Forward, speed)
    }

    pub fn backward(axis: Axis, speed: u8) -> Self {
        Self::new(axis, Direction::Backward, speed)
    }

    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stop
    }

    pub fn channel(&self) -> u8 {
        self.axis.channel()
    }
}

/// Renders the full wire line including the trailing newline
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}:{}:{}",
            self.channel(),
            self.direction.as_char(),
            self.speed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("Expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("Unknown channel: {0}")]
    Channel(String),

    #[error("Unknown direction: {0}")]
    Direction(String),

    #[error("Speed out of range: {0}")]
    Speed(String),
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(':').collect();
        let [channel, direction, speed] = fields.as_slice() else {
            return Err(CommandParseError::FieldCount(fields.len()));
        };

        let axis = channel
            .parse::<u8>()
            .ok()
            .and_then(Axis::from_channel)
            .ok_or_else(|| CommandParseError::Channel(channel.to_string()))?;

        let mut chars = direction.chars();
        let direction = match (chars.next(), chars.next()) {
            (Some(c), None) => Direction::from_char(c),
            _ => None,
        }
        .ok_or_else(|| CommandParseError::Direction(direction.to_string()))?;

        let speed = speed
            .parse::<u8>()
            .map_err(|_| CommandParseError::Speed(speed.to_string()))?;

        Ok(Command::new(axis, direction, speed))
    }
}
