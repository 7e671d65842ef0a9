//! External measurement source sampled at each scan stop.

use super::CHANNELS;

/// Source of one four-channel measurement per scan stop.
///
/// Implemented by the optics side of the bench (centroid fitting, power
/// meters); anything that can be called repeatedly for four scalars works.
pub trait MeasurementSource {
    /// Take one measurement at the current stage position
    fn measure(&mut self) -> Result<[f64; CHANNELS], String>;
}

impl<F> MeasurementSource for F
where
    F: FnMut() -> [f64; CHANNELS],
{
    fn measure(&mut self) -> Result<[f64; CHANNELS], String> {
        Ok(self())
    }
}
