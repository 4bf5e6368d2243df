//! Typed dartboard segment labels (`T20`, `D16`, `5`, `25`, `BULL`, `0`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a dart landed, in the label vocabulary used by events and fusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Segment {
    /// Outside the outer double ring (label `0`).
    Miss,
    Single(u8),
    Double(u8),
    Triple(u8),
    /// Outer bull (label `25`).
    OuterBull,
    /// Inner bull (label `BULL`).
    Bull,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid segment label {0:?}")]
pub struct ParseSegmentError(pub String);

impl Segment {
    /// Build from a base value and multiplier. Bulls only exist as singles.
    pub fn from_parts(value: u32, multiplier: u32) -> Option<Self> {
        match (value, multiplier) {
            (0, 1) => Some(Self::Miss),
            (25, 1) => Some(Self::OuterBull),
            (50, 1) => Some(Self::Bull),
            (n @ 1..=20, 1) => Some(Self::Single(n as u8)),
            (n @ 1..=20, 2) => Some(Self::Double(n as u8)),
            (n @ 1..=20, 3) => Some(Self::Triple(n as u8)),
            _ => None,
        }
    }

    /// Base value: the wedge number, 25 / 50 for the bulls, 0 for a miss.
    pub fn value(&self) -> u32 {
        match *self {
            Self::Miss => 0,
            Self::Single(n) | Self::Double(n) | Self::Triple(n) => n as u32,
            Self::OuterBull => 25,
            Self::Bull => 50,
        }
    }

    pub fn multiplier(&self) -> u32 {
        match self {
            Self::Double(_) => 2,
            Self::Triple(_) => 3,
            _ => 1,
        }
    }

    /// Points scored by a dart in this segment.
    pub fn points(&self) -> u32 {
        self.value() * self.multiplier()
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => f.write_str("0"),
            Self::Single(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "D{n}"),
            Self::Triple(n) => write!(f, "T{n}"),
            Self::OuterBull => f.write_str("25"),
            Self::Bull => f.write_str("BULL"),
        }
    }
}

impl FromStr for Segment {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSegmentError(s.to_string());
        let number = |digits: &str| digits.parse::<u32>().map_err(|_| err());

        let (value, multiplier) = match s {
            "BULL" => (50, 1),
            "25" => (25, 1),
            _ => {
                if let Some(rest) = s.strip_prefix('T') {
                    (number(rest)?, 3)
                } else if let Some(rest) = s.strip_prefix('D') {
                    (number(rest)?, 2)
                } else {
                    (number(s)?, 1)
                }
            }
        };
        Self::from_parts(value, multiplier).ok_or_else(err)
    }
}

impl From<Segment> for String {
    fn from(s: Segment) -> Self {
        s.to_string()
    }
}

impl TryFrom<String> for Segment {
    type Error = ParseSegmentError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Label for a `(value, multiplier)` pair, `None` if no such segment exists.
pub fn format_segment(value: u32, multiplier: u32) -> Option<String> {
    Segment::from_parts(value, multiplier).map(|s| s.to_string())
}

/// Inverse of [`format_segment`]: `BULL`→(50,1), `25`→(25,1), `T<n>`→(n,3),
/// `D<n>`→(n,2), bare `<n>`→(n,1).
pub fn parse_segment(label: &str) -> Option<(u32, u32)> {
    label
        .parse::<Segment>()
        .ok()
        .map(|s| (s.value(), s.multiplier()))
}
