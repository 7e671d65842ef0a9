use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Degrees per encoder count on the rotary axis.
pub const ROTARY_DEG_PER_COUNT: f64 = 0.00012;

/// Micrometers per encoder count on the X and Y linear axes.
pub const XY_UM_PER_COUNT: f64 = 0.5;

/// Micrometers per encoder count on the Z linear axis.
pub const Z_UM_PER_COUNT: f64 = 0.1;

/// Address of the first controller bay. Bays are numbered in axis order.
pub const BAY_BASE_ADDRESS: u8 = 0x21;

/// Stage axis identifiers.
///
/// The stage has one rotary axis and three linear axes, each driven by its own
/// controller bay. Ordering follows the bay order, which is also the order
/// axes are polled in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    ValueEnum,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AxisId {
    /// Rotary axis, physical unit degrees
    Rotary,
    /// X linear axis, physical unit µm
    X,
    /// Y linear axis, physical unit µm
    Y,
    /// Z linear axis, physical unit µm
    Z,
}

impl AxisId {
    /// All axes in bay order.
    pub const ALL: [AxisId; 4] = [AxisId::Rotary, AxisId::X, AxisId::Y, AxisId::Z];

    /// Zero-based bay index.
    pub fn index(self) -> usize {
        match self {
            AxisId::Rotary => 0,
            AxisId::X => 1,
            AxisId::Y => 2,
            AxisId::Z => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Channel ident carried in per-axis payloads (1-based).
    pub fn channel(self) -> u16 {
        self.index() as u16 + 1
    }

    /// Inverse of [`channel`](Self::channel).
    pub fn from_channel(channel: u16) -> Option<Self> {
        channel
            .checked_sub(1)
            .and_then(|index| Self::from_index(index as usize))
    }

    /// Destination address of the controller bay driving this axis.
    pub fn destination(self) -> u8 {
        BAY_BASE_ADDRESS + self.index() as u8
    }

    /// Physical units per raw encoder count.
    pub fn scale(self) -> f64 {
        match self {
            AxisId::Rotary => ROTARY_DEG_PER_COUNT,
            AxisId::X | AxisId::Y => XY_UM_PER_COUNT,
            AxisId::Z => Z_UM_PER_COUNT,
        }
    }

    /// Physical unit label.
    pub fn unit(self) -> &'static str {
        match self {
            AxisId::Rotary => "deg",
            AxisId::X | AxisId::Y | AxisId::Z => "µm",
        }
    }

    /// Convert a raw encoder count to physical units.
    pub fn raw_to_physical(self, raw: i32) -> f64 {
        raw as f64 * self.scale()
    }

    /// Convert a physical position to the nearest raw encoder count.
    ///
    /// Values beyond the `i32` range saturate.
    pub fn physical_to_raw(self, physical: f64) -> i32 {
        (physical / self.scale()).round() as i32
    }
}

impl std::str::FromStr for AxisId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotary" | "r" | "0" => Ok(AxisId::Rotary),
            "x" | "1" => Ok(AxisId::X),
            "y" | "2" => Ok(AxisId::Y),
            "z" | "3" => Ok(AxisId::Z),
            _ => Err(format!("Invalid axis: {s}, expected rotary, x, y or z")),
        }
    }
}
