//! Ordinary least squares with a single predictor.

use ndarray::{Array1, ArrayView1};

use crate::error::{GeneSetError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub residuals: Array1<f64>,
}

/// Fit `y = intercept + slope * x` by least squares.
pub fn least_squares(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(GeneSetError::input(format!(
            "regression on {} predictors and {} responses",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(GeneSetError::input("regression needs at least two points"));
    }

    let (Some(mean_x), Some(mean_y)) = (x.mean(), y.mean()) else {
        return Err(GeneSetError::input("regression on empty data"));
    };

    let dx = x.mapv(|v| v - mean_x);
    let dy = y.mapv(|v| v - mean_y);
    let sxx = dx.dot(&dx);
    if sxx <= 0.0 || !sxx.is_finite() {
        return Err(GeneSetError::numeric(
            "least squares",
            "predictor has no variance",
        ));
    }
    let slope = dx.dot(&dy) / sxx;
    let intercept = mean_y - slope * mean_x;

    let residuals = ndarray::Zip::from(&x)
        .and(&y)
        .map_collect(|&xi, &yi| yi - (intercept + slope * xi));

    Ok(LinearFit {
        intercept,
        slope,
        residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_exact_line() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let fit = least_squares(x.view(), y.view()).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        for r in fit.residuals.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_residuals_sum_to_zero() {
        let x = array![0.1, 0.5, 0.3, 0.9, 0.7];
        let y = array![1.0, -2.0, 0.5, 3.0, 0.0];
        let fit = least_squares(x.view(), y.view()).unwrap();
        assert_relative_eq!(fit.residuals.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_predictor_rejected() {
        let x = array![1.0, 1.0, 1.0];
        let y = array![1.0, 2.0, 3.0];
        assert!(least_squares(x.view(), y.view()).is_err());
    }
}
