//! Stage interface trait for scan workflows.

use std::time::Duration;

use crate::apt::{AxisId, StageResult};

/// Interface for single-axis stage control
///
/// Abstracts the stage hardware for testability in scan workflows.
pub trait StageInterface {
    /// Command an absolute move of one axis
    ///
    /// # Arguments
    /// * `axis` - Axis to move
    /// * `position` - Target in physical units (degrees for rotary, µm otherwise)
    fn move_to(&mut self, axis: AxisId, position: f64) -> StageResult<()>;

    /// Block until every axis reports motion complete, or `timeout` elapses
    fn wait_settled(&mut self, timeout: Duration) -> StageResult<()>;

    /// Read the current position of one axis in physical units
    fn position(&mut self, axis: AxisId) -> StageResult<f64>;
}
