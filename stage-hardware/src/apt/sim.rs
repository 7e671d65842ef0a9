//! In-process stage controller for tests and `--simulate` runs.
//!
//! The simulator answers the host's frames the way the rack does: it tracks a
//! raw encoder count per axis, keeps an axis "moving" for a configurable number
//! of status polls after each move, and can be told to cut upcoming responses
//! short or to stop answering altogether.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::axis::AxisId;
use super::error::StageResult;
use super::frame::{msg_id, Command};
use super::link::{LinkTransport, ReceiveHandler};
use super::messages::{FirmwareVersion, HardwareInfo, Message};
use super::status::StatusBits;

type SharedHandler = Arc<Mutex<Option<ReceiveHandler>>>;

#[derive(Debug)]
struct SimState {
    raw_positions: [i32; 4],
    moving_polls_left: [u32; 4],
    direction: [StatusBits; 4],
    homed: [bool; 4],
    moving_polls: u32,
    truncate_next: u32,
    muted: bool,
    received: Vec<Command>,
    status_polls: [u32; 4],
    info: HardwareInfo,
}

impl SimState {
    fn new() -> Self {
        Self {
            raw_positions: [0; 4],
            moving_polls_left: [0; 4],
            direction: [StatusBits::MOVING_CW; 4],
            homed: [false; 4],
            moving_polls: 2,
            truncate_next: 0,
            muted: false,
            received: Vec::new(),
            status_polls: [0; 4],
            info: HardwareInfo {
                serial_number: 70_000_001,
                model: "BSC104".to_string(),
                hardware_type: 44,
                firmware: FirmwareVersion {
                    major: 1,
                    interim: 0,
                    minor: 3,
                },
                notes: "simulated four-axis rack".to_string(),
                hardware_version: 1,
                module_state: 0,
                num_channels: 4,
            },
        }
    }

    fn start_move(&mut self, axis: AxisId, raw_target: i32) {
        let i = axis.index();
        self.direction[i] = if raw_target >= self.raw_positions[i] {
            StatusBits::MOVING_CW
        } else {
            StatusBits::MOVING_CCW
        };
        self.raw_positions[i] = raw_target;
        self.moving_polls_left[i] = self.moving_polls;
    }

    fn status_word(&mut self, axis: AxisId) -> StatusBits {
        let i = axis.index();
        self.status_polls[i] += 1;
        let mut status = StatusBits::CONNECTED | StatusBits::ENABLED;
        if self.homed[i] {
            status |= StatusBits::HOMED;
        }
        if self.moving_polls_left[i] > 0 {
            self.moving_polls_left[i] -= 1;
            status |= self.direction[i];
        }
        status
    }

    /// Apply a command and build the response, if the command has one.
    fn handle(&mut self, command: Command) -> Option<Message> {
        self.received.push(command.clone());

        let response = match (command.opcode, command.axis) {
            (msg_id::HW_REQ_INFO, _) => Some(Message::HardwareInfo(self.info.clone())),
            (msg_id::REQ_ENC_COUNTER, Some(axis)) => Some(Message::EncoderCounter {
                axis,
                raw_position: self.raw_positions[axis.index()],
            }),
            (msg_id::REQ_STATUS_UPDATE, Some(axis)) => {
                let status = self.status_word(axis);
                Some(Message::MotorStatusUpdate {
                    axis,
                    raw_position: self.raw_positions[axis.index()],
                    status,
                })
            }
            (msg_id::MOVE_ABSOLUTE, Some(axis)) => {
                if let Some(target) = command.raw_target() {
                    self.start_move(axis, target);
                }
                None
            }
            (msg_id::MOVE_HOME, Some(axis)) => {
                self.start_move(axis, 0);
                self.homed[axis.index()] = true;
                None
            }
            (msg_id::MOVE_STOP, Some(axis)) => {
                self.moving_polls_left[axis.index()] = 0;
                None
            }
            _ => {
                warn!("Simulator ignoring command {}", command);
                None
            }
        };

        if self.muted {
            return None;
        }
        response
    }
}

/// Simulated four-axis controller.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// controller owns another as its link.
#[derive(Clone)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
    handler: SharedHandler,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Report moving for `polls` status requests after each move.
    pub fn with_moving_polls(self, polls: u32) -> Self {
        self.lock().moving_polls = polls;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place an axis at a physical position without commanding a move.
    pub fn set_position(&self, axis: AxisId, position: f64) {
        self.set_raw_position(axis, axis.physical_to_raw(position));
    }

    pub fn set_raw_position(&self, axis: AxisId, raw: i32) {
        self.lock().raw_positions[axis.index()] = raw;
    }

    pub fn raw_position(&self, axis: AxisId) -> i32 {
        self.lock().raw_positions[axis.index()]
    }

    /// Report `axis` as moving for the next `polls` status requests.
    pub fn hold_moving(&self, axis: AxisId, polls: u32) {
        self.lock().moving_polls_left[axis.index()] = polls;
    }

    /// Cut the next `count` responses to half their length.
    pub fn truncate_next_responses(&self, count: u32) {
        self.lock().truncate_next = count;
    }

    /// Stop answering requests; commands are still recorded.
    pub fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Every command received so far, in order.
    pub fn received(&self) -> Vec<Command> {
        self.lock().received.clone()
    }

    pub fn count_received(&self, opcode: u16) -> usize {
        self.lock()
            .received
            .iter()
            .filter(|command| command.opcode == opcode)
            .count()
    }

    /// Number of status requests answered for `axis`.
    pub fn status_polls(&self, axis: AxisId) -> u32 {
        self.lock().status_polls[axis.index()]
    }

    fn deliver(&self, bytes: &[u8]) {
        let mut guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(handler) => handler(bytes),
            None => debug!("Simulator response dropped, no handler registered"),
        }
    }
}

impl LinkTransport for SimulatedController {
    fn write(&mut self, bytes: &[u8]) -> StageResult<()> {
        let command = match Command::parse(bytes) {
            Ok(command) => command,
            Err(e) => {
                warn!("Simulator received malformed frame {:02X?}: {}", bytes, e);
                return Ok(());
            }
        };

        let response = {
            let mut state = self.lock();
            state.handle(command).map(|message| {
                let mut encoded = message.encode();
                if state.truncate_next > 0 {
                    state.truncate_next -= 1;
                    encoded.truncate(encoded.len() / 2);
                }
                encoded
            })
        };

        if let Some(bytes) = response {
            self.deliver(&bytes);
        }
        Ok(())
    }

    fn set_receive_handler(&mut self, handler: ReceiveHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
