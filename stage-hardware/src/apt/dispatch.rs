//! Receive path: reassemble inbound bursts into frames and apply them to the store.
//!
//! A burst is whatever the link delivered after the line went quiet, so a
//! frame may be split across bursts. The unfinished tail of a burst is kept
//! and completed by the next one until the controller writes a new command.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use super::error::CodecError;
use super::frame::{msg_id, Frame};
use super::link::ReceiveHandler;
use super::messages::Message;
use super::store::AxisStatusStore;

/// Bytes of a frame whose declared length has not arrived yet.
#[derive(Debug, Default)]
struct PartialFrame {
    bytes: Vec<u8>,
    /// `Truncated` already raised for this frame
    reported: bool,
}

/// Decodes received bytes and updates the shared [`AxisStatusStore`].
///
/// Clones share the reassembly buffer, so the controller can hold one to
/// discard a stale partial frame while the link owns another as its handler.
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    store: Arc<AxisStatusStore>,
    partial: Arc<Mutex<PartialFrame>>,
}

impl ResponseDispatcher {
    pub fn new(store: Arc<AxisStatusStore>) -> Self {
        Self {
            store,
            partial: Arc::new(Mutex::new(PartialFrame::default())),
        }
    }

    fn lock_partial(&self) -> MutexGuard<'_, PartialFrame> {
        self.partial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending_len(&self) -> usize {
        self.lock_partial().bytes.len()
    }

    /// Drop any unfinished frame. Called before each write, since the
    /// response to the new command starts on a frame boundary.
    pub fn discard_pending(&self) {
        let mut partial = self.lock_partial();
        if !partial.bytes.is_empty() {
            debug!("Discarding {} bytes of unfinished frame", partial.bytes.len());
        }
        *partial = PartialFrame::default();
    }

    /// Process one burst, which may finish an earlier frame and hold several
    /// back-to-back frames.
    ///
    /// A frame still short at the end of the burst raises one `Truncated`
    /// event, however many bursts it takes to complete.
    pub fn on_bytes(&self, bytes: &[u8]) {
        let mut partial = self.lock_partial();
        let mut buffer = std::mem::take(&mut partial.bytes);
        buffer.extend_from_slice(bytes);

        let mut rest = buffer.as_slice();
        while !rest.is_empty() {
            let frame = match Frame::parse(rest) {
                Ok(frame) => frame,
                Err(CodecError::Truncated { expected, got }) => {
                    partial.bytes = rest.to_vec();
                    if partial.reported {
                        trace!("Frame still incomplete: {} of {} bytes", got, expected);
                    } else {
                        warn!(
                            "Truncated frame: header declares {} bytes, received {}",
                            expected, got
                        );
                        partial.reported = true;
                        self.store.report_truncated();
                    }
                    return;
                }
                Err(e) => {
                    warn!("Dropping unparseable bytes {:02X?}: {}", rest, e);
                    break;
                }
            };
            partial.reported = false;
            rest = &rest[frame.wire_len()..];
            self.handle_frame(frame);
        }
    }

    /// Decode a complete frame and apply it.
    pub fn handle_frame(&self, frame: Frame) {
        let message_id = frame.message_id;
        let message = match Message::from_frame(frame, self.store.last_queried()) {
            Ok(message) => message,
            Err(CodecError::Truncated { expected, got }) => {
                warn!(
                    "{} payload too short: expected {} bytes, got {}",
                    msg_id::name(message_id),
                    expected,
                    got
                );
                self.store.report_truncated();
                return;
            }
            Err(e) => {
                warn!("Dropping {}: {}", msg_id::name(message_id), e);
                return;
            }
        };

        match &message {
            Message::Unknown {
                message_id,
                payload,
            } => {
                warn!(
                    "Unhandled message id 0x{:04X}, payload {:02X?}",
                    message_id, payload
                );
            }
            Message::MotorStatusUpdate {
                axis,
                raw_position,
                status,
            } => {
                trace!("Status {}: raw {} bits {:?}", axis, raw_position, status);
                if status.at_limit() {
                    warn!("Axis {} reports limit switch active: {:?}", axis, status);
                }
            }
            Message::EncoderCounter { axis, raw_position } => {
                trace!("Encoder {}: raw {}", axis, raw_position);
            }
            Message::HardwareInfo(info) => {
                debug!("Hardware info: {} serial {}", info.model, info.serial_number);
            }
        }

        self.store.apply(message);
    }

    /// Wrap this dispatcher as a link receive handler.
    pub fn into_handler(self) -> ReceiveHandler {
        Box::new(move |bytes: &[u8]| self.on_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apt::axis::AxisId;
    use crate::apt::frame::HOST_ADDRESS;
    use crate::apt::status::StatusBits;
    use crate::apt::store::LinkEvent;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn dispatcher() -> (ResponseDispatcher, Arc<AxisStatusStore>) {
        let store = Arc::new(AxisStatusStore::new());
        (ResponseDispatcher::new(Arc::clone(&store)), store)
    }

    #[test]
    fn test_burst_with_two_frames() {
        let (dispatcher, store) = dispatcher();
        let mut burst = Message::MotorStatusUpdate {
            axis: AxisId::X,
            raw_position: 40,
            status: StatusBits::MOVING_CW,
        }
        .encode();
        burst.extend(
            Message::MotorStatusUpdate {
                axis: AxisId::Y,
                raw_position: 60,
                status: StatusBits::empty(),
            }
            .encode(),
        );

        dispatcher.on_bytes(&burst);

        assert_eq!(store.generation(), 2);
        assert_abs_diff_eq!(store.axis_state(AxisId::X).position, 20.0);
        assert!(store.axis_state(AxisId::X).moving);
        assert_abs_diff_eq!(store.axis_state(AxisId::Y).position, 30.0);
    }

    #[test]
    fn test_truncated_burst_reports_event() {
        let (dispatcher, store) = dispatcher();
        let bytes = Message::EncoderCounter {
            axis: AxisId::Z,
            raw_position: 10,
        }
        .encode();
        store.note_query(AxisId::Z);

        dispatcher.on_bytes(&bytes[..8]);

        assert_eq!(
            store.wait_for_event(0, Duration::ZERO),
            Some((1, LinkEvent::Truncated))
        );
        assert_abs_diff_eq!(store.axis_state(AxisId::Z).position, 0.0);
    }

    #[test]
    fn test_frame_split_across_bursts_is_reassembled() {
        let (dispatcher, store) = dispatcher();
        let bytes = Message::MotorStatusUpdate {
            axis: AxisId::X,
            raw_position: 90,
            status: StatusBits::MOVING_CCW,
        }
        .encode();

        dispatcher.on_bytes(&bytes[..6]);
        assert_eq!(dispatcher.pending_len(), 6);
        dispatcher.on_bytes(&bytes[6..]);

        assert_eq!(dispatcher.pending_len(), 0);
        assert_eq!(
            store.wait_for_event(0, Duration::ZERO),
            Some((1, LinkEvent::Truncated))
        );
        assert_eq!(
            store.wait_for_event(1, Duration::ZERO),
            Some((2, LinkEvent::Status(AxisId::X)))
        );
        assert_abs_diff_eq!(store.axis_state(AxisId::X).position, 45.0);
        assert!(store.axis_state(AxisId::X).moving);
    }

    #[test]
    fn test_three_way_split_reports_once() {
        let (dispatcher, store) = dispatcher();
        store.note_query(AxisId::Y);
        let bytes = Message::EncoderCounter {
            axis: AxisId::Y,
            raw_position: 22,
        }
        .encode();

        dispatcher.on_bytes(&bytes[..3]);
        dispatcher.on_bytes(&bytes[3..9]);
        dispatcher.on_bytes(&bytes[9..]);

        assert_eq!(store.generation(), 2);
        assert_eq!(
            store.wait_for_event(1, Duration::ZERO),
            Some((2, LinkEvent::Position(AxisId::Y)))
        );
        assert_abs_diff_eq!(store.axis_state(AxisId::Y).position, 11.0);
    }

    #[test]
    fn test_tail_completes_frame_then_next_frame_parses() {
        let (dispatcher, store) = dispatcher();
        let first = Message::MotorStatusUpdate {
            axis: AxisId::Z,
            raw_position: 10,
            status: StatusBits::empty(),
        }
        .encode();
        let second = Message::MotorStatusUpdate {
            axis: AxisId::Rotary,
            raw_position: 0,
            status: StatusBits::empty(),
        }
        .encode();

        dispatcher.on_bytes(&first[..10]);
        let mut burst = first[10..].to_vec();
        burst.extend_from_slice(&second);
        dispatcher.on_bytes(&burst);

        assert_eq!(store.generation(), 3);
        assert_eq!(
            store.wait_for_event(2, Duration::ZERO),
            Some((3, LinkEvent::Status(AxisId::Rotary)))
        );
        assert_abs_diff_eq!(store.axis_state(AxisId::Z).position, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_discard_pending_resyncs_on_fresh_frame() {
        let (dispatcher, store) = dispatcher();
        store.note_query(AxisId::X);
        let bytes = Message::EncoderCounter {
            axis: AxisId::X,
            raw_position: 64,
        }
        .encode();

        dispatcher.on_bytes(&bytes[..8]);
        dispatcher.discard_pending();
        assert_eq!(dispatcher.pending_len(), 0);
        dispatcher.on_bytes(&bytes);

        assert_eq!(store.generation(), 2);
        assert_abs_diff_eq!(store.axis_state(AxisId::X).position, 32.0);

        // A later short frame is a new occurrence
        dispatcher.on_bytes(&bytes[..4]);
        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn test_encoder_counter_attributed_to_last_query() {
        let (dispatcher, store) = dispatcher();
        store.note_query(AxisId::Rotary);
        let bytes = Message::EncoderCounter {
            axis: AxisId::X,
            raw_position: 10_000,
        }
        .encode();

        dispatcher.on_bytes(&bytes);

        assert_abs_diff_eq!(store.axis_state(AxisId::Rotary).position, 1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(store.axis_state(AxisId::X).position, 0.0);
    }

    #[test]
    fn test_unknown_id_leaves_store_untouched() {
        let (dispatcher, store) = dispatcher();
        let frame = Frame::new(0x0491, HOST_ADDRESS, 0x22, vec![2, 0, 1, 2, 3]);

        dispatcher.on_bytes(&frame.to_bytes());

        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_handler_forwards_bytes() {
        let (dispatcher, store) = dispatcher();
        let mut handler = dispatcher.into_handler();
        store.note_query(AxisId::Y);
        handler(
            &Message::EncoderCounter {
                axis: AxisId::Y,
                raw_position: -8,
            }
            .encode(),
        );
        assert_abs_diff_eq!(store.axis_state(AxisId::Y).position, -4.0);
    }
}
