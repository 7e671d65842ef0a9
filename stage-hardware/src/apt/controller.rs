//! Request/response motion control over a [`LinkTransport`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::axis::AxisId;
use super::config::ControllerConfig;
use super::dispatch::ResponseDispatcher;
use super::error::{StageError, StageResult};
use super::frame::{Command, StopMode};
use super::link::LinkTransport;
use super::messages::HardwareInfo;
use super::store::{AxisState, AxisStatusStore, LinkEvent};
use crate::stage_interface::StageInterface;

/// Progress of a [`MotionController::wait_for_settled`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    Idle,
    /// Waiting on the status response of this axis
    Polling(AxisId),
}

/// Four-axis stage controller.
///
/// Commands are sent one at a time; each query waits for its decoded
/// response to land in the [`AxisStatusStore`] before the next is written.
pub struct MotionController<L: LinkTransport> {
    link: L,
    store: Arc<AxisStatusStore>,
    dispatcher: ResponseDispatcher,
    config: ControllerConfig,
    last_command: Option<Command>,
}

impl<L: LinkTransport> MotionController<L> {
    /// Take ownership of `link` and route its received bytes into a new store.
    pub fn new(mut link: L, config: ControllerConfig) -> Self {
        let store = Arc::new(AxisStatusStore::new());
        let dispatcher = ResponseDispatcher::new(Arc::clone(&store));
        link.set_receive_handler(dispatcher.clone().into_handler());
        Self {
            link,
            store,
            dispatcher,
            config,
            last_command: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Shared state updated by the receive path.
    pub fn store(&self) -> &Arc<AxisStatusStore> {
        &self.store
    }

    /// Most recently sent command.
    pub fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }
    }

    /// Write a command and pause for the settle delay.
    ///
    /// Any unfinished response frame is dropped first; the reply to this
    /// command starts on a fresh frame.
    pub fn send(&mut self, command: Command) -> StageResult<()> {
        debug!("Send {}", command);
        let bytes = command.encode();
        self.last_command = Some(command);
        self.dispatcher.discard_pending();
        self.link.write(&bytes)?;
        self.settle();
        Ok(())
    }

    /// Write the last command again.
    pub fn retransmit_last(&mut self) -> StageResult<()> {
        let command = self.last_command.as_ref().ok_or(StageError::NoCommand)?;
        warn!("Retransmitting {}", command);
        let bytes = command.encode();
        self.dispatcher.discard_pending();
        self.link.write(&bytes)?;
        self.settle();
        Ok(())
    }

    /// Send a query and wait for the response event it should produce.
    ///
    /// Each truncated response triggers one retransmission, up to
    /// `max_retransmits`.
    fn transact(&mut self, command: Command, expected: LinkEvent) -> StageResult<()> {
        let opcode = command.opcode;
        let description = command.to_string();
        if let Some(axis) = command.axis {
            self.store.note_query(axis);
        }

        let mut since = self.store.generation();
        self.send(command)?;

        let mut retransmits = 0;
        loop {
            let Some((generation, event)) =
                self.store.wait_for_event(since, self.config.response_timeout)
            else {
                return Err(StageError::Timeout {
                    operation: format!("response to {description}"),
                    waited: self.config.response_timeout,
                });
            };
            since = generation;

            if event == expected {
                return Ok(());
            }
            if event != LinkEvent::Truncated {
                trace!("Ignoring {:?} while waiting for {:?}", event, expected);
                continue;
            }
            if retransmits >= self.config.max_retransmits {
                return Err(StageError::RetryExhausted {
                    opcode,
                    attempts: retransmits,
                });
            }
            retransmits += 1;
            self.retransmit_last()?;
        }
    }

    fn read_position(&mut self, axis: AxisId) -> StageResult<f64> {
        self.transact(Command::request_encoder(axis), LinkEvent::Position(axis))?;
        Ok(self.store.axis_state(axis).position)
    }

    /// Read positions in physical units. An empty slice reads all four axes.
    pub fn get_position(&mut self, axes: &[AxisId]) -> StageResult<BTreeMap<AxisId, f64>> {
        let axes: &[AxisId] = if axes.is_empty() { &AxisId::ALL } else { axes };
        let mut positions = BTreeMap::new();
        for &axis in axes {
            let position = self.read_position(axis)?;
            debug!("Position {} = {:.4} {}", axis, position, axis.unit());
            positions.insert(axis, position);
        }
        Ok(positions)
    }

    /// Command absolute moves, one axis at a time in axis order.
    ///
    /// Axes start moving as their command arrives; there is no common start.
    pub fn goto_position(&mut self, targets: &BTreeMap<AxisId, f64>) -> StageResult<()> {
        for (&axis, &target) in targets {
            let raw = axis.physical_to_raw(target);
            debug!("Move {} to {:.4} {} (raw {})", axis, target, axis.unit(), raw);
            self.send(Command::move_absolute(axis, raw))?;
        }
        Ok(())
    }

    /// Request and return the status of one axis.
    pub fn query_status(&mut self, axis: AxisId) -> StageResult<AxisState> {
        self.transact(Command::request_status(axis), LinkEvent::Status(axis))?;
        Ok(self.store.axis_state(axis))
    }

    /// Poll all four axes until every one reports its moving flag clear.
    pub fn wait_for_settled(&mut self, timeout: Duration) -> StageResult<()> {
        let start = Instant::now();
        let mut state = SettleState::Idle;
        loop {
            let mut settled = true;
            for axis in AxisId::ALL {
                let next = SettleState::Polling(axis);
                trace!("Settle state {:?} -> {:?}", state, next);
                state = next;
                settled &= !self.query_status(axis)?.moving;
            }
            trace!("Settle state {:?} -> {:?}", state, SettleState::Idle);
            state = SettleState::Idle;

            if settled {
                debug!("Stage settled after {:?}", start.elapsed());
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(StageError::Timeout {
                    operation: "stage to settle".to_string(),
                    waited,
                });
            }
            if !self.config.poll_interval.is_zero() {
                thread::sleep(self.config.poll_interval);
            }
        }
    }

    /// Identify the controller.
    pub fn hardware_info(&mut self) -> StageResult<HardwareInfo> {
        self.transact(Command::hardware_info(), LinkEvent::HardwareInfo)?;
        self.store
            .hardware_info()
            .ok_or_else(|| StageError::MissingResponse("hardware info request".to_string()))
    }

    /// Drive one axis to its home position.
    pub fn home(&mut self, axis: AxisId) -> StageResult<()> {
        info!("Homing {}", axis);
        self.send(Command::move_home(axis))
    }

    /// Stop the given axes. An empty slice stops all four.
    pub fn stop(&mut self, axes: &[AxisId], mode: StopMode) -> StageResult<()> {
        let axes: &[AxisId] = if axes.is_empty() { &AxisId::ALL } else { axes };
        for &axis in axes {
            info!("Stopping {} ({:?})", axis, mode);
            self.send(Command::move_stop(axis, mode))?;
        }
        Ok(())
    }
}

impl<L: LinkTransport> StageInterface for MotionController<L> {
    fn move_to(&mut self, axis: AxisId, position: f64) -> StageResult<()> {
        self.goto_position(&BTreeMap::from([(axis, position)]))
    }

    fn wait_settled(&mut self, timeout: Duration) -> StageResult<()> {
        self.wait_for_settled(timeout)
    }

    fn position(&mut self, axis: AxisId) -> StageResult<f64> {
        self.read_position(axis)
    }
}
