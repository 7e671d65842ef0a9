//! Drivers for the four-axis alignment stage.
//!
//! # Features
//!
//! - `serial` (default) - serial port link via the `serialport` crate. Without
//!   it only the simulated controller is available.

pub mod apt;
pub mod stage_interface;

pub use stage_interface::StageInterface;
