//! First-degree least-squares fit of a measurement channel against position.

use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

/// Result of fitting `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination (R²). 1.0 when the data has no variance.
    pub r_squared: f64,
}

/// Errors that can occur during line fitting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Not enough points to fit
    #[error("insufficient data: expected at least {expected}, got {got}")]
    InsufficientData { expected: usize, got: usize },

    /// Position and value slices differ in length
    #[error("length mismatch: {x_len} positions, {y_len} values")]
    LengthMismatch { x_len: usize, y_len: usize },

    /// All positions identical, slope undefined
    #[error("positions have zero spread")]
    DegeneratePositions,

    /// NaN or infinite input
    #[error("non-finite input value")]
    NonFinite,
}

/// Ordinary least-squares line through `(x, y)`.
pub fn fit_line(x: &[f64], y: &[f64]) -> Result<LinearFit, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(FitError::InsufficientData {
            expected: 2,
            got: x.len(),
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let x = Array1::from_vec(x.to_vec());
    let y = Array1::from_vec(y.to_vec());

    let x_mean = x.mean().unwrap_or(0.0);
    let y_mean = y.mean().unwrap_or(0.0);
    let dx = &x - x_mean;
    let dy = &y - y_mean;

    let sxx = dx.dot(&dx);
    if sxx < f64::EPSILON {
        return Err(FitError::DegeneratePositions);
    }

    let slope = dx.dot(&dy) / sxx;
    let intercept = y_mean - slope * x_mean;

    let ss_tot = dy.dot(&dy);
    let residuals = &y - &(&x * slope + intercept);
    let ss_res = residuals.dot(&residuals);
    let r_squared = if ss_tot < f64::EPSILON {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}
