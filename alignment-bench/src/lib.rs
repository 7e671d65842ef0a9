//! Alignment scans for the four-axis stage.
//!
//! Sweeps one stage axis through evenly spaced stops, takes an external
//! four-channel measurement at each settled stop and reduces the sweep to a
//! per-channel slope against position.

pub mod scan;
