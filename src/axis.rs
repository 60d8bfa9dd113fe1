//! Axis identities of the arm and their wire channels

use serde::{Deserialize, Serialize};
use std::fmt;

/// One controllable degree of freedom of the arm
///
/// The discriminant order matches the wire channel table (`M1 = 1` … `S3 = 7`)
/// and is used to index per-axis storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    M1,
    M2,
    M3,
    M4,
    S1,
    S2,
    S3,
}

impl Axis {
    /// All axes in channel order
    pub const ALL: [Axis; 7] = [
        Axis::M1,
        Axis::M2,
        Axis::M3,
        Axis::M4,
        Axis::S1,
        Axis::S2,
        Axis::S3,
    ];

    /// Axes with an encoder and therefore a hold mode
    pub const HOLDABLE: [Axis; 6] = [Axis::M1, Axis::M2, Axis::M3, Axis::M4, Axis::S2, Axis::S3];

    /// Wire identifier used in outgoing commands
    pub fn channel(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Reverse lookup of [`Axis::channel`]
    pub fn from_channel(channel: u8) -> Option<Self> {
        match channel {
            1..=7 => Some(Self::ALL[channel as usize - 1]),
            _ => None,
        }
    }

    /// Position in [`Axis::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// S1 is a linear actuator without encoder: extend/retract only
    pub fn is_holdable(self) -> bool {
        !matches!(self, Axis::S1)
    }

    pub fn description(self) -> &'static str {
        match self {
            Axis::M1 => "End-Effector Up/Down",
            Axis::M2 => "Lower Link Up/Down",
            Axis::M3 => "Lower Link Left",
            Axis::M4 => "End-Effector Left",
            Axis::S1 => "Linear Actuator",
            Axis::S2 => "End-Effector Right",
            Axis::S3 => "Lower Link Right",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::M1 => "M1",
            Axis::M2 => "M2",
            Axis::M3 => "M3",
            Axis::M4 => "M4",
            Axis::S1 => "S1",
            Axis::S2 => "S2",
            Axis::S3 => "S3",
        };
        write!(f, "{}", name)
    }
}
