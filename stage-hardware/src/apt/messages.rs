//! Typed responses from the stage controller and their decoding.

use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use super::axis::AxisId;
use super::error::CodecError;
use super::frame::{msg_id, Frame, HEADER_LEN, HOST_ADDRESS, RACK_ADDRESS};
use super::status::StatusBits;

/// Payload length of an encoder counter response.
pub const ENC_COUNTER_PAYLOAD_LEN: usize = 4;

/// Payload length of a motor status update response.
pub const STATUS_UPDATE_PAYLOAD_LEN: usize = 10;

/// Raw hardware information payload as laid out on the wire.
///
/// Multi-byte fields are kept as byte arrays; byte order is applied when
/// converting to [`HardwareInfo`].
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct HardwareInfoPayload {
    serial_number: [u8; 4],
    model: [u8; 8],
    hardware_type: [u8; 2],
    /// minor, interim, major, unused
    firmware: [u8; 4],
    notes: [u8; 48],
    reserved: [u8; 12],
    hardware_version: [u8; 2],
    module_state: [u8; 2],
    num_channels: [u8; 2],
}

/// Firmware version reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub interim: u8,
    pub minor: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.interim, self.minor)
    }
}

/// Controller identification returned for a hardware-info request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareInfo {
    pub serial_number: u32,
    pub model: String,
    pub hardware_type: u16,
    pub firmware: FirmwareVersion,
    pub notes: String,
    pub hardware_version: u16,
    pub module_state: u16,
    pub num_channels: u16,
}

/// Decode a NUL-padded ASCII field.
fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| b as char).collect()
}

fn put_ascii_field(dest: &mut [u8], text: &str) {
    for (slot, byte) in dest.iter_mut().zip(text.bytes()) {
        *slot = byte;
    }
}

impl HardwareInfo {
    /// Payload length of the hardware-info response.
    pub const PAYLOAD_LEN: usize = std::mem::size_of::<HardwareInfoPayload>();

    fn from_payload(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < Self::PAYLOAD_LEN {
            return Err(CodecError::Truncated {
                expected: HEADER_LEN + Self::PAYLOAD_LEN,
                got: HEADER_LEN + payload.len(),
            });
        }
        let raw: HardwareInfoPayload = bytemuck::pod_read_unaligned(&payload[..Self::PAYLOAD_LEN]);

        Ok(Self {
            serial_number: u32::from_le_bytes(raw.serial_number),
            model: ascii_field(&raw.model),
            hardware_type: u16::from_le_bytes(raw.hardware_type),
            firmware: FirmwareVersion {
                major: raw.firmware[2],
                interim: raw.firmware[1],
                minor: raw.firmware[0],
            },
            notes: ascii_field(&raw.notes),
            hardware_version: u16::from_le_bytes(raw.hardware_version),
            module_state: u16::from_le_bytes(raw.module_state),
            num_channels: u16::from_le_bytes(raw.num_channels),
        })
    }

    fn to_payload(&self) -> Vec<u8> {
        let mut raw = HardwareInfoPayload::zeroed();
        raw.serial_number = self.serial_number.to_le_bytes();
        put_ascii_field(&mut raw.model, &self.model);
        raw.hardware_type = self.hardware_type.to_le_bytes();
        raw.firmware = [self.firmware.minor, self.firmware.interim, self.firmware.major, 0];
        put_ascii_field(&mut raw.notes, &self.notes);
        raw.hardware_version = self.hardware_version.to_le_bytes();
        raw.module_state = self.module_state.to_le_bytes();
        raw.num_channels = self.num_channels.to_le_bytes();
        bytemuck::bytes_of(&raw).to_vec()
    }
}

/// Decoded controller response.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HardwareInfo(HardwareInfo),
    /// Position and status word for one axis.
    MotorStatusUpdate {
        axis: AxisId,
        raw_position: i32,
        status: StatusBits,
    },
    /// Position only. The controller omits the axis, so it is taken from the
    /// most recently queried axis.
    EncoderCounter { axis: AxisId, raw_position: i32 },
    /// Unrecognised message id. Kept for diagnostic logging, not an error.
    Unknown { message_id: u16, payload: Vec<u8> },
}

fn require_payload(frame: &Frame, len: usize) -> Result<(), CodecError> {
    if frame.payload.len() < len {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN + len,
            got: frame.wire_len(),
        });
    }
    Ok(())
}

impl Message {
    /// Interpret a parsed frame.
    ///
    /// `last_queried` is the axis of the most recent query and is only used
    /// for encoder counter responses.
    pub fn from_frame(frame: Frame, last_queried: Option<AxisId>) -> Result<Self, CodecError> {
        match frame.message_id {
            msg_id::HW_GET_INFO => HardwareInfo::from_payload(&frame.payload).map(Message::HardwareInfo),
            msg_id::GET_STATUS_UPDATE => {
                require_payload(&frame, STATUS_UPDATE_PAYLOAD_LEN)?;
                let mut payload = &frame.payload[..];
                let channel = payload.get_u16_le();
                let axis = AxisId::from_channel(channel).ok_or(CodecError::InvalidAxis(channel))?;
                let raw_position = payload.get_i32_le();
                let status = StatusBits::from_bits_retain(payload.get_u32());
                Ok(Message::MotorStatusUpdate {
                    axis,
                    raw_position,
                    status,
                })
            }
            msg_id::GET_ENC_COUNTER => {
                require_payload(&frame, ENC_COUNTER_PAYLOAD_LEN)?;
                let axis = last_queried.ok_or(CodecError::UnattributedCounter)?;
                let raw_position = (&frame.payload[..]).get_i32_le();
                Ok(Message::EncoderCounter { axis, raw_position })
            }
            message_id => Ok(Message::Unknown {
                message_id,
                payload: frame.payload,
            }),
        }
    }

    /// Message id this response is sent with.
    pub fn message_id(&self) -> u16 {
        match self {
            Message::HardwareInfo(_) => msg_id::HW_GET_INFO,
            Message::MotorStatusUpdate { .. } => msg_id::GET_STATUS_UPDATE,
            Message::EncoderCounter { .. } => msg_id::GET_ENC_COUNTER,
            Message::Unknown { message_id, .. } => *message_id,
        }
    }

    /// Encode as a controller-to-host frame.
    pub fn to_frame(&self) -> Frame {
        let (source, payload) = match self {
            Message::HardwareInfo(info) => (RACK_ADDRESS, info.to_payload()),
            Message::MotorStatusUpdate {
                axis,
                raw_position,
                status,
            } => {
                let mut buf = BytesMut::with_capacity(STATUS_UPDATE_PAYLOAD_LEN);
                buf.put_u16_le(axis.channel());
                buf.put_i32_le(*raw_position);
                buf.put_u32(status.bits());
                (axis.destination(), buf.to_vec())
            }
            Message::EncoderCounter { axis, raw_position } => {
                (axis.destination(), raw_position.to_le_bytes().to_vec())
            }
            Message::Unknown { payload, .. } => (RACK_ADDRESS, payload.clone()),
        };
        Frame::new(self.message_id(), HOST_ADDRESS, source, payload)
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.to_frame().to_bytes()
    }
}

/// Decode one controller response from the start of `bytes`.
///
/// Returns [`CodecError::Truncated`] when fewer bytes are present than the
/// header declares (`header byte 3 + 6`).
pub fn decode(bytes: &[u8], last_queried: Option<AxisId>) -> Result<Message, CodecError> {
    Message::from_frame(Frame::parse(bytes)?, last_queried)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> HardwareInfo {
        HardwareInfo {
            serial_number: 70_123_456,
            model: "BSC104".to_string(),
            hardware_type: 44,
            firmware: FirmwareVersion {
                major: 1,
                interim: 0,
                minor: 7,
            },
            notes: "4-axis stepper rack".to_string(),
            hardware_version: 3,
            module_state: 0,
            num_channels: 4,
        }
    }

    #[test]
    fn test_hardware_info_payload_size() {
        assert_eq!(HardwareInfo::PAYLOAD_LEN, 84);
    }

    #[test]
    fn test_hardware_info_round_trip() {
        let info = sample_info();
        let bytes = Message::HardwareInfo(info.clone()).encode();
        assert_eq!(bytes.len(), HEADER_LEN + 84);
        assert_eq!(decode(&bytes, None), Ok(Message::HardwareInfo(info)));
    }

    #[test]
    fn test_hardware_info_field_offsets() {
        let bytes = Message::HardwareInfo(sample_info()).encode();
        let payload = &bytes[HEADER_LEN..];
        assert_eq!(&payload[0..4], &70_123_456u32.to_le_bytes());
        assert_eq!(&payload[4..10], b"BSC104");
        assert_eq!(&payload[14..17], &[7, 0, 1]);
        assert_eq!(&payload[82..84], &[4, 0]);
    }

    #[test]
    fn test_status_update_byte_orders() {
        let bytes = [
            0x81, 0x04, 0x0A, 0x00, 0x81, 0x23, // header
            0x03, 0x00, // channel 3 (Y)
            0x78, 0x56, 0x34, 0x12, // position, swapped
            0x80, 0x00, 0x04, 0x10, // status word, direct
        ];
        assert_eq!(
            decode(&bytes, None),
            Ok(Message::MotorStatusUpdate {
                axis: AxisId::Y,
                raw_position: 0x1234_5678,
                status: StatusBits::from_bits_retain(0x8000_0410),
            })
        );
    }

    #[test]
    fn test_status_update_round_trip() {
        let sent = Message::MotorStatusUpdate {
            axis: AxisId::Z,
            raw_position: -42_000,
            status: StatusBits::MOVING_CCW | StatusBits::ENABLED | StatusBits::HOMED,
        };
        let decoded = decode(&sent.encode(), None).unwrap();
        assert_eq!(decoded, sent);
        match decoded {
            Message::MotorStatusUpdate { status, .. } => assert!(status.is_moving()),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_encoder_counter_uses_last_queried_axis() {
        let bytes = Message::EncoderCounter {
            axis: AxisId::Rotary,
            raw_position: 123_456,
        }
        .encode();
        assert_eq!(bytes.len(), HEADER_LEN + ENC_COUNTER_PAYLOAD_LEN);

        assert_eq!(
            decode(&bytes, Some(AxisId::X)),
            Ok(Message::EncoderCounter {
                axis: AxisId::X,
                raw_position: 123_456
            })
        );
        assert_eq!(decode(&bytes, None), Err(CodecError::UnattributedCounter));
    }

    #[test]
    fn test_encoder_counter_swapped_order() {
        let bytes = [0x0B, 0x04, 0x04, 0x00, 0x81, 0x22, 0xFE, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            decode(&bytes, Some(AxisId::X)),
            Ok(Message::EncoderCounter {
                axis: AxisId::X,
                raw_position: -2
            })
        );
    }

    #[test]
    fn test_truncated_frame() {
        let bytes = Message::EncoderCounter {
            axis: AxisId::X,
            raw_position: 9,
        }
        .encode();
        assert_eq!(
            decode(&bytes[..7], Some(AxisId::X)),
            Err(CodecError::Truncated {
                expected: 10,
                got: 7
            })
        );
    }

    #[test]
    fn test_short_payload_for_message_type() {
        let frame = Frame::new(msg_id::GET_STATUS_UPDATE, HOST_ADDRESS, 0x21, vec![1, 0, 0, 0]);
        assert!(matches!(
            decode(&frame.to_bytes(), None),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_message_preserves_payload() {
        let frame = Frame::new(0x0464, HOST_ADDRESS, 0x21, vec![1, 0, 0xAA]);
        assert_eq!(
            decode(&frame.to_bytes(), None),
            Ok(Message::Unknown {
                message_id: 0x0464,
                payload: vec![1, 0, 0xAA]
            })
        );
    }

    #[test]
    fn test_invalid_channel() {
        let frame = Frame::new(
            msg_id::GET_STATUS_UPDATE,
            HOST_ADDRESS,
            0x21,
            vec![7, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        );
        assert_eq!(
            decode(&frame.to_bytes(), None),
            Err(CodecError::InvalidAxis(7))
        );
    }
}
