//! Scan sequencing, fitting and longitudinal slope tracking.

mod config;
mod fit;
mod history;
mod measurement;
mod orchestrator;
mod sequence;

pub use config::{ConfigError, ScanConfig, ScanRequest, DEFAULT_SETTLE_TIMEOUT_MS};
pub use fit::{fit_line, FitError, LinearFit};
pub use history::TrackHistory;
pub use measurement::MeasurementSource;
pub use orchestrator::{ScanError, ScanOrchestrator, ScanPoint, ScanResult};
pub use sequence::{orient_nearest, scan_positions, with_return_sweep};

/// Number of measurement channels per scan point.
pub const CHANNELS: usize = 4;
