//! Feedforward OLS fit: builds the mechanism-specific regressor and solves it.

use crate::error::Result;
use crate::ols;
use crate::types::{AnalysisType, Dataset, FeedforwardGains, PreparedData};
use nalgebra::{DMatrix, DVector};

/// One regressor row for the given mechanism type, in the column order
/// matching `AnalysisType::beta_labels`.
fn regressor_row(kind: AnalysisType, p: &PreparedData) -> Vec<f64> {
    let sign_v = p.velocity.signum();
    match kind {
        AnalysisType::Simple | AnalysisType::Drivetrain | AnalysisType::DrivetrainAngular => {
            vec![sign_v, p.velocity, p.acceleration]
        }
        AnalysisType::Elevator => vec![sign_v, 1.0, p.velocity, p.acceleration],
        AnalysisType::Arm => vec![sign_v, p.cos, p.velocity, p.acceleration],
    }
}

/// Fit the feedforward model for `kind` against `dataset`'s combined points.
pub fn fit(kind: AnalysisType, dataset: &Dataset) -> Result<FeedforwardGains> {
    let points = dataset.combined_points();
    fit_points(kind, &points)
}

/// Same as [`fit`] but over an explicit point sequence, for callers that want
/// to override the dataset selection.
pub fn fit_points(kind: AnalysisType, points: &[PreparedData]) -> Result<FeedforwardGains> {
    let k = kind.independent_variables();
    let n = points.len();
    let mut x = DMatrix::zeros(n, k);
    let mut y = DVector::zeros(n);
    for (row, p) in points.iter().enumerate() {
        for (col, value) in regressor_row(kind, p).into_iter().enumerate() {
            x[(row, col)] = value;
        }
        y[row] = p.voltage;
    }

    let result = ols::fit(&x, &y)?;
    Ok(FeedforwardGains {
        beta: result.beta.iter().copied().collect(),
        rmse: result.rmse,
        r_squared: result.r_squared,
    })
}
