//! Step-and-measure scan executor.
//!
//! Moves one axis through a stop sequence, waits for the stage to settle at
//! each stop, reads back the achieved position and samples the measurement
//! source. The sweep is reduced to one slope per measurement channel.

use std::time::Duration;

use serde::Serialize;
use stage_hardware::apt::{AxisId, StageError};
use stage_hardware::StageInterface;
use thiserror::Error;
use tracing::{debug, info};

use super::config::ScanRequest;
use super::fit::{fit_line, FitError, LinearFit};
use super::history::TrackHistory;
use super::measurement::MeasurementSource;
use super::sequence::{orient_nearest, scan_positions, with_return_sweep};
use super::CHANNELS;

/// Error during a scan
#[derive(Error, Debug)]
pub enum ScanError {
    /// Fewer than two stops requested
    #[error("stop count must be at least 2, got {0}")]
    InvalidStopCount(usize),

    /// Non-finite scan bounds
    #[error("scan range must be finite, got {start} to {end}")]
    InvalidRange { start: f64, end: f64 },

    /// Stage communication or motion error
    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    /// Measurement source failed
    #[error("measurement error: {0}")]
    Measurement(String),

    /// Slope could not be fitted
    #[error("fit error: {0}")]
    Fit(#[from] FitError),
}

/// One stop of a scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanPoint {
    /// Position the axis was commanded to
    pub commanded_position: f64,
    /// Position read back after settling
    pub actual_position: f64,
    /// Measurement taken at this stop
    pub measurement: [f64; CHANNELS],
}

/// Outcome of a completed scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub axis: AxisId,
    pub points: Vec<ScanPoint>,
    /// Slope of each measurement channel against actual position
    pub slopes: [f64; CHANNELS],
    pub fits: [LinearFit; CHANNELS],
}

impl ScanResult {
    pub fn commanded_positions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.commanded_position).collect()
    }

    pub fn actual_positions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.actual_position).collect()
    }
}

/// Scan executor
pub struct ScanOrchestrator<S: StageInterface, M: MeasurementSource> {
    stage: S,
    source: M,
    settle_timeout: Duration,
    history: TrackHistory,
}

impl<S: StageInterface, M: MeasurementSource> ScanOrchestrator<S, M> {
    /// Create a new scan executor
    ///
    /// `settle_timeout` bounds the wait for motion to finish at each stop.
    pub fn new(stage: S, source: M, settle_timeout: Duration) -> Self {
        Self {
            stage,
            source,
            settle_timeout,
            history: TrackHistory::new(),
        }
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn into_parts(self) -> (S, M, TrackHistory) {
        (self.stage, self.source, self.history)
    }

    /// Build the stop sequence for `request`, reading the current position
    /// when the nearer end should come first.
    pub fn plan(&mut self, request: &ScanRequest) -> Result<Vec<f64>, ScanError> {
        request.validate()?;

        let mut positions = scan_positions(request.start, request.end, request.stop_count);
        if request.scan_back {
            positions = with_return_sweep(positions);
        }
        if request.start_nearest {
            let current = self.stage.position(request.axis)?;
            debug!("Current {} position {:.4}", request.axis, current);
            positions = orient_nearest(positions, current);
        }
        Ok(positions)
    }

    /// Run a scan and record its slopes in the history.
    ///
    /// The stage is left at the final stop.
    pub fn scan(&mut self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let positions = self.plan(request)?;
        let axis = request.axis;
        info!(
            "Scanning {} over {} stops from {:.4} to {:.4} {}",
            axis,
            positions.len(),
            positions.first().copied().unwrap_or(request.start),
            positions.last().copied().unwrap_or(request.end),
            axis.unit()
        );

        let mut points = Vec::with_capacity(positions.len());
        for (i, &commanded_position) in positions.iter().enumerate() {
            self.stage.move_to(axis, commanded_position)?;
            self.stage.wait_settled(self.settle_timeout)?;
            let actual_position = self.stage.position(axis)?;
            let measurement = self.source.measure().map_err(ScanError::Measurement)?;

            info!(
                "Stop {}/{}: commanded {:.4}, actual {:.4}, measurement {:?}",
                i + 1,
                positions.len(),
                commanded_position,
                actual_position,
                measurement
            );
            points.push(ScanPoint {
                commanded_position,
                actual_position,
                measurement,
            });
        }

        let actual: Vec<f64> = points.iter().map(|p| p.actual_position).collect();
        let mut fits = [LinearFit::default(); CHANNELS];
        for (channel, fit) in fits.iter_mut().enumerate() {
            let values: Vec<f64> = points.iter().map(|p| p.measurement[channel]).collect();
            *fit = fit_line(&actual, &values)?;
        }
        let slopes = fits.map(|fit| fit.slope);

        info!("Scan complete, slopes {:?}", slopes);
        self.history.append(slopes);

        Ok(ScanResult {
            axis,
            points,
            slopes,
            fits,
        })
    }
}
