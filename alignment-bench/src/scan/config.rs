//! Scan parameters and their JSON configuration file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stage_hardware::apt::AxisId;
use thiserror::Error;

use super::orchestrator::ScanError;

/// Default time allowed for the stage to settle at each stop.
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 30_000;

/// One sweep of a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub axis: AxisId,
    /// First stop in physical units
    pub start: f64,
    /// Last stop in physical units
    pub end: f64,
    /// Number of evenly spaced stops, including both ends
    pub stop_count: usize,
    /// Append the reversed sequence (return sweep for hysteresis)
    pub scan_back: bool,
    /// Begin from whichever end is nearer the current position
    pub start_nearest: bool,
}

impl ScanRequest {
    pub fn new(axis: AxisId, start: f64, end: f64, stop_count: usize) -> Self {
        Self {
            axis,
            start,
            end,
            stop_count,
            scan_back: false,
            start_nearest: false,
        }
    }

    pub fn with_scan_back(mut self, scan_back: bool) -> Self {
        self.scan_back = scan_back;
        self
    }

    pub fn with_start_nearest(mut self, start_nearest: bool) -> Self {
        self.start_nearest = start_nearest;
        self
    }

    /// Reject requests that cannot produce a sequence.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.stop_count < 2 {
            return Err(ScanError::InvalidStopCount(self.stop_count));
        }
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(ScanError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of points a completed scan holds.
    pub fn point_count(&self) -> usize {
        if self.scan_back {
            self.stop_count * 2
        } else {
            self.stop_count
        }
    }
}

/// Errors loading a [`ScanConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid scan: {0}")]
    Invalid(#[from] ScanError),
}

/// Scan configuration as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub axis: AxisId,
    pub start: f64,
    pub end: f64,
    pub stop_count: usize,
    pub scan_back: bool,
    pub start_nearest: bool,
    /// Settle timeout per stop in milliseconds
    pub settle_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            axis: AxisId::X,
            start: 0.0,
            end: 100.0,
            stop_count: 5,
            scan_back: false,
            start_nearest: false,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
        }
    }
}

impl ScanConfig {
    /// Load and validate a JSON config file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.request().validate()?;
        Ok(config)
    }

    pub fn request(&self) -> ScanRequest {
        ScanRequest {
            axis: self.axis,
            start: self.start,
            end: self.end,
            stop_count: self.stop_count,
            scan_back: self.scan_back,
            start_nearest: self.start_nearest,
        }
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}
