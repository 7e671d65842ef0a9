//! Motor status word reported in status update frames

use bitflags::bitflags;

bitflags! {
    /// Per-axis motor status word (32 bits)
    ///
    /// Only the two moving bits drive control flow. The remaining flags are
    /// decoded for logging and diagnostics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusBits: u32 {
        /// Clockwise hardware limit switch engaged
        const CW_HARD_LIMIT = 1 << 0;
        /// Counter-clockwise hardware limit switch engaged
        const CCW_HARD_LIMIT = 1 << 1;
        /// Clockwise software limit reached
        const CW_SOFT_LIMIT = 1 << 2;
        /// Counter-clockwise software limit reached
        const CCW_SOFT_LIMIT = 1 << 3;
        /// Moving clockwise
        const MOVING_CW = 1 << 4;
        /// Moving counter-clockwise
        const MOVING_CCW = 1 << 5;
        /// Jogging clockwise
        const JOGGING_CW = 1 << 6;
        /// Jogging counter-clockwise
        const JOGGING_CCW = 1 << 7;
        /// Motor connected
        const CONNECTED = 1 << 8;
        /// Homing in progress
        const HOMING = 1 << 9;
        /// Homed (position reference established)
        const HOMED = 1 << 10;
        // Bit 11 reserved
        /// Interlock open
        const INTERLOCK = 1 << 12;
        /// Channel enabled
        const ENABLED = 1 << 31;
    }
}

impl StatusBits {
    /// Any hardware or software limit
    pub const LIMITS: StatusBits = StatusBits::CW_HARD_LIMIT
        .union(StatusBits::CCW_HARD_LIMIT)
        .union(StatusBits::CW_SOFT_LIMIT)
        .union(StatusBits::CCW_SOFT_LIMIT);

    /// Moving flag: bit 4 OR bit 5.
    pub fn is_moving(self) -> bool {
        self.intersects(StatusBits::MOVING_CW | StatusBits::MOVING_CCW)
    }

    pub fn at_limit(self) -> bool {
        self.intersects(Self::LIMITS)
    }

    pub fn is_homing(self) -> bool {
        self.contains(StatusBits::HOMING)
    }

    pub fn is_homed(self) -> bool {
        self.contains(StatusBits::HOMED)
    }

    pub fn interlock(self) -> bool {
        self.contains(StatusBits::INTERLOCK)
    }
}
