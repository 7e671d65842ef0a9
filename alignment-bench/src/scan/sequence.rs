//! Stop sequence generation.

/// `stop_count` evenly spaced positions from `start` to `end` inclusive.
///
/// The last element is exactly `end`. Callers validate `stop_count >= 2`;
/// a count of one yields just `start`.
pub fn scan_positions(start: f64, end: f64, stop_count: usize) -> Vec<f64> {
    if stop_count < 2 {
        return vec![start; stop_count];
    }
    let step = (end - start) / (stop_count - 1) as f64;
    let mut positions: Vec<f64> = (0..stop_count - 1)
        .map(|i| start + i as f64 * step)
        .collect();
    positions.push(end);
    positions
}

/// Append the reversed sequence, returning to the starting stop.
pub fn with_return_sweep(mut positions: Vec<f64>) -> Vec<f64> {
    let back: Vec<f64> = positions.iter().rev().copied().collect();
    positions.extend(back);
    positions
}

/// Reverse the sequence when its last stop is strictly nearer `current`
/// than its first.
pub fn orient_nearest(mut positions: Vec<f64>, current: f64) -> Vec<f64> {
    if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
        if (last - current).abs() < (first - current).abs() {
            positions.reverse();
        }
    }
    positions
}
