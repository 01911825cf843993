//! Geometric track-width estimate for angular drivetrain tests.

use crate::error::{Error, Result};

const HEADING_EPSILON: f64 = 1e-9;

/// `(|leftDelta| + |rightDelta|) / |headingDelta|`.
pub fn calculate_track_width(left_delta: f64, right_delta: f64, heading_delta: f64) -> Result<f64> {
    if heading_delta.abs() < HEADING_EPSILON {
        return Err(Error::ZeroHeadingChange);
    }
    Ok((left_delta.abs() + right_delta.abs()) / heading_delta.abs())
}
