//! Slope vectors of completed scans, oldest first.

use serde::Serialize;

use super::CHANNELS;

/// Append-only record of per-channel slopes, one entry per completed scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackHistory {
    slopes: Vec<[f64; CHANNELS]>,
}

impl TrackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, slopes: [f64; CHANNELS]) {
        self.slopes.push(slopes);
    }

    pub fn clear(&mut self) {
        self.slopes.clear();
    }

    pub fn len(&self) -> usize {
        self.slopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    pub fn latest(&self) -> Option<&[f64; CHANNELS]> {
        self.slopes.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64; CHANNELS]> {
        self.slopes.iter()
    }

    /// Change in slope for `channel` between the first and latest scan.
    ///
    /// `None` with fewer than two scans or a channel out of range.
    pub fn drift(&self, channel: usize) -> Option<f64> {
        if channel >= CHANNELS || self.slopes.len() < 2 {
            return None;
        }
        let first = self.slopes.first()?;
        let latest = self.slopes.last()?;
        Some(latest[channel] - first[channel])
    }
}
