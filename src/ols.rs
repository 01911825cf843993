//! Ordinary least squares by normal equations.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Result of an OLS fit: coefficients plus fit-quality statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct OlsResult {
    pub beta: DVector<f64>,
    pub rmse: f64,
    pub r_squared: f64,
}

/// Solve `X beta = y` in the least-squares sense via the normal equations
/// `beta = (X^T X)^-1 X^T y`, the same inversion idiom used elsewhere in this
/// crate's Kalman-style updates.
pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsResult> {
    assert_eq!(x.nrows(), y.len(), "regressor and target row counts must match");

    let xt = x.transpose();
    let xtx = &xt * x;
    let xtx_inv = xtx.try_inverse().ok_or(Error::SingularNormalMatrix)?;
    let beta = xtx_inv * &xt * y;

    let fitted = x * &beta;
    let residuals = y - &fitted;
    let n = y.len() as f64;
    let rmse = (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt();

    let y_mean = y.iter().sum::<f64>() / n;
    let ss_tot: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let r_squared = if ss_tot.abs() < f64::EPSILON {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(OlsResult { beta, rmse, r_squared })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_model_with_no_noise() {
        // y = 2 + 3*x1 - x2
        let rows = [
            (1.0, 2.0),
            (2.0, 1.0),
            (3.0, 4.0),
            (4.0, 0.0),
            (5.0, 2.0),
            (0.5, -1.0),
        ];
        let x = DMatrix::from_row_slice(
            rows.len(),
            3,
            &rows
                .iter()
                .flat_map(|(x1, x2)| [1.0, *x1, *x2])
                .collect::<Vec<_>>(),
        );
        let y = DVector::from_iterator(rows.len(), rows.iter().map(|(x1, x2)| 2.0 + 3.0 * x1 - x2));

        let result = fit(&x, &y).unwrap();
        assert!((result.beta[0] - 2.0).abs() < 1e-9);
        assert!((result.beta[1] - 3.0).abs() < 1e-9);
        assert!((result.beta[2] - (-1.0)).abs() < 1e-9);
        assert!(result.rmse < 1e-9);
        assert!((result.r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn singular_normal_matrix_is_reported() {
        // Two identical columns make X^T X singular.
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(matches!(fit(&x, &y), Err(Error::SingularNormalMatrix)));
    }
}
