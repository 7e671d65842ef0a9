//! Frame layout and command encoding.
//!
//! Every message starts with a fixed 6-byte header followed by an optional
//! payload:
//!
//! ```text
//! [id_lo, id_hi, payload_len, reserved, destination, source] [payload ...]
//! ```
//!
//! Framing is length-prefixed, never delimiter based. When a payload follows,
//! bit 7 of the destination byte (the ack/data flag) is set.
//!
//! # Byte order
//!
//! 32-bit payload fields do not share one byte order. Positions and encoder
//! counts are sent least-significant byte first ("swapped"), while the motor
//! status word is sent in wire order, most-significant byte first ("direct").
//! This mirrors the real controller and is applied per field:
//!
//! | Message | Field | Order |
//! |---|---|---|
//! | `0x040B` encoder counter | position | swapped |
//! | `0x0481` status update | position | swapped |
//! | `0x0481` status update | status word | direct |
//! | `0x0453` move absolute | target | swapped |
//!
//! Channel idents and the 16-bit hardware-info fields are little-endian.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use super::axis::AxisId;
use super::error::CodecError;

/// Length of the fixed frame header.
pub const HEADER_LEN: usize = 6;

/// Source address used for frames sent by the host.
pub const HOST_ADDRESS: u8 = 0x01;

/// Address of the rack controller (module-level requests).
pub const RACK_ADDRESS: u8 = 0x11;

/// Ack/data flag set on the destination byte when a payload follows.
pub const PAYLOAD_FLAG: u8 = 0x80;

/// Known message identifiers.
pub mod msg_id {
    /// Request hardware information (no payload)
    pub const HW_REQ_INFO: u16 = 0x0005;
    /// Hardware information response
    pub const HW_GET_INFO: u16 = 0x0006;
    /// Request encoder counter for one axis
    pub const REQ_ENC_COUNTER: u16 = 0x040A;
    /// Encoder counter response (axis omitted)
    pub const GET_ENC_COUNTER: u16 = 0x040B;
    /// Home one axis
    pub const MOVE_HOME: u16 = 0x0443;
    /// Absolute move for one axis
    pub const MOVE_ABSOLUTE: u16 = 0x0453;
    /// Stop one axis
    pub const MOVE_STOP: u16 = 0x0465;
    /// Request motor status for one axis
    pub const REQ_STATUS_UPDATE: u16 = 0x0480;
    /// Motor status update response
    pub const GET_STATUS_UPDATE: u16 = 0x0481;

    /// Human-readable name for logging.
    pub fn name(id: u16) -> &'static str {
        match id {
            HW_REQ_INFO => "HW_REQ_INFO",
            HW_GET_INFO => "HW_GET_INFO",
            REQ_ENC_COUNTER => "REQ_ENC_COUNTER",
            GET_ENC_COUNTER => "GET_ENC_COUNTER",
            MOVE_HOME => "MOVE_HOME",
            MOVE_ABSOLUTE => "MOVE_ABSOLUTE",
            MOVE_STOP => "MOVE_STOP",
            REQ_STATUS_UPDATE => "REQ_STATUS_UPDATE",
            GET_STATUS_UPDATE => "GET_STATUS_UPDATE",
            _ => "UNKNOWN",
        }
    }
}

/// One length-prefixed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u16,
    /// Destination address, including the ack/data flag
    pub destination: u8,
    pub source: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, setting the ack/data flag when a payload is present.
    pub fn new(message_id: u16, destination: u8, source: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= u8::MAX as usize, "payload too long");
        let destination = if payload.is_empty() {
            destination & !PAYLOAD_FLAG
        } else {
            destination | PAYLOAD_FLAG
        };
        Self {
            message_id,
            destination,
            source,
            payload,
        }
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Destination address without the ack/data flag.
    pub fn address(&self) -> u8 {
        self.destination & !PAYLOAD_FLAG
    }

    /// Number of bytes the frame at the start of `bytes` declares
    /// (`header byte 3 + 6`).
    pub fn declared_len(bytes: &[u8]) -> Result<usize, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(bytes[2] as usize + HEADER_LEN)
    }

    /// Parse the frame at the start of `bytes`.
    ///
    /// Bytes past the declared length are left for the next frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let expected = Self::declared_len(bytes)?;
        if bytes.len() < expected {
            return Err(CodecError::Truncated {
                expected,
                got: bytes.len(),
            });
        }

        let mut header = &bytes[..HEADER_LEN];
        let message_id = header.get_u16_le();
        let _payload_len = header.get_u8();
        let _reserved = header.get_u8();
        let destination = header.get_u8();
        let source = header.get_u8();

        Ok(Self {
            message_id,
            destination,
            source,
            payload: bytes[HEADER_LEN..expected].to_vec(),
        })
    }

    /// Serialize header and payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u16_le(self.message_id);
        buf.put_u8(self.payload.len() as u8);
        buf.put_u8(0);
        buf.put_u8(self.destination);
        buf.put_u8(self.source);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }
}

/// Stop behaviour for [`msg_id::MOVE_STOP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopMode {
    /// Stop abruptly
    Immediate = 0x01,
    /// Decelerate along the velocity profile
    Profiled = 0x02,
}

impl StopMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0x01 => StopMode::Immediate,
            _ => StopMode::Profiled,
        }
    }
}

/// A host-to-controller command.
///
/// Every command the controller sends is kept as the "last command" until the
/// next one, so it can be retransmitted after a truncated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: u16,
    pub axis: Option<AxisId>,
    pub params: Vec<u8>,
}

impl Command {
    fn for_axis(opcode: u16, axis: AxisId, extra: impl FnOnce(&mut BytesMut)) -> Self {
        let mut params = BytesMut::with_capacity(8);
        params.put_u16_le(axis.channel());
        extra(&mut params);
        Self {
            opcode,
            axis: Some(axis),
            params: params.to_vec(),
        }
    }

    /// Hardware information request, addressed to the rack.
    pub fn hardware_info() -> Self {
        Self {
            opcode: msg_id::HW_REQ_INFO,
            axis: None,
            params: Vec::new(),
        }
    }

    /// Encoder counter (position) request for one axis.
    pub fn request_encoder(axis: AxisId) -> Self {
        Self::for_axis(msg_id::REQ_ENC_COUNTER, axis, |_| {})
    }

    /// Motor status request for one axis.
    pub fn request_status(axis: AxisId) -> Self {
        Self::for_axis(msg_id::REQ_STATUS_UPDATE, axis, |_| {})
    }

    /// Absolute move to a raw encoder count.
    pub fn move_absolute(axis: AxisId, raw_target: i32) -> Self {
        Self::for_axis(msg_id::MOVE_ABSOLUTE, axis, |buf| {
            buf.put_i32_le(raw_target)
        })
    }

    pub fn move_home(axis: AxisId) -> Self {
        Self::for_axis(msg_id::MOVE_HOME, axis, |_| {})
    }

    pub fn move_stop(axis: AxisId, mode: StopMode) -> Self {
        Self::for_axis(msg_id::MOVE_STOP, axis, |buf| buf.put_u8(mode as u8))
    }

    /// Destination address: the axis bay, or the rack for module requests.
    pub fn destination(&self) -> u8 {
        self.axis.map_or(RACK_ADDRESS, AxisId::destination)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(
            self.opcode,
            self.destination(),
            HOST_ADDRESS,
            self.params.clone(),
        )
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().to_bytes()
    }

    /// Parse a host-to-controller frame back into a command.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let frame = Frame::parse(bytes)?;
        if frame.payload.is_empty() {
            return Ok(Self {
                opcode: frame.message_id,
                axis: None,
                params: frame.payload,
            });
        }
        if frame.payload.len() < 2 {
            return Err(CodecError::Truncated {
                expected: HEADER_LEN + 2,
                got: frame.wire_len(),
            });
        }
        let channel = (&frame.payload[..2]).get_u16_le();
        let axis = AxisId::from_channel(channel).ok_or(CodecError::InvalidAxis(channel))?;
        Ok(Self {
            opcode: frame.message_id,
            axis: Some(axis),
            params: frame.payload,
        })
    }

    /// Target of an absolute move, in raw counts.
    pub fn raw_target(&self) -> Option<i32> {
        if self.opcode != msg_id::MOVE_ABSOLUTE || self.params.len() < 6 {
            return None;
        }
        Some((&self.params[2..6]).get_i32_le())
    }

    /// Stop mode of a stop command.
    pub fn stop_mode(&self) -> Option<StopMode> {
        if self.opcode != msg_id::MOVE_STOP {
            return None;
        }
        self.params.get(2).map(|&b| StopMode::from_u8(b))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", msg_id::name(self.opcode))?;
        if let Some(axis) = self.axis {
            write!(f, "[{axis}]")?;
        }
        if let Some(target) = self.raw_target() {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}

/// Encode a command to wire bytes.
pub fn encode(command: &Command) -> Vec<u8> {
    command.encode()
}
