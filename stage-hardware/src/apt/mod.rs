//! Driver for a four-axis (rotary, X, Y, Z) stepper stage rack.
//!
//! The rack speaks a binary, length-prefixed protocol over a serial link.
//! This module covers:
//!
//! - [`frame`] / [`messages`]: frame layout, command encoding and response decoding
//! - [`link`]: the byte transport and a serial port implementation
//! - [`store`] / [`dispatch`]: the receive path and shared per-axis state
//! - [`controller`]: request/response motion control on top of both
//! - [`sim`]: an in-process controller used by tests and `--simulate`
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//! use stage_hardware::apt::{AxisId, ControllerConfig, LinkConfig, MotionController, SerialLink};
//!
//! let link = SerialLink::open(&LinkConfig::new("/dev/ttyUSB0"))?;
//! let mut stage = MotionController::new(link, ControllerConfig::default());
//!
//! stage.goto_position(&BTreeMap::from([(AxisId::X, 50.0)]))?;
//! stage.wait_for_settled(Duration::from_secs(10))?;
//! println!("{:?}", stage.get_position(&[])?);
//! # Ok::<(), stage_hardware::apt::StageError>(())
//! ```

pub mod axis;
pub mod config;
pub mod controller;
pub mod dispatch;
mod error;
pub mod frame;
pub mod link;
pub mod messages;
pub mod sim;
pub mod status;
pub mod store;

pub use axis::AxisId;
pub use config::{ControllerConfig, LinkConfig, StageArgs};
pub use controller::{MotionController, SettleState};
pub use dispatch::ResponseDispatcher;
pub use error::{CodecError, StageError, StageResult};
pub use frame::{encode, msg_id, Command, Frame, StopMode};
#[cfg(feature = "serial")]
pub use link::SerialLink;
pub use link::{LinkTransport, ReceiveHandler};
pub use messages::{decode, FirmwareVersion, HardwareInfo, Message};
pub use sim::SimulatedController;
pub use status::StatusBits;
pub use store::{AxisState, AxisStatusStore, LinkEvent};
