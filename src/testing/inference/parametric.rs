//! Analytic normal models.
//!
//! Resampled null distributions for large gene sets converge to a normal shape; once
//! they do, their tails are read from a fitted [`NormalModel`] instead of a binned CDF.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{GeneSetError, Result};
use crate::testing::utils::variance_from_sums;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalModel {
    mean: f64,
    std_dev: f64,
    dist: Normal,
}

impl NormalModel {
    pub fn new(mean: f64, variance: f64) -> Result<Self> {
        if !mean.is_finite() || !variance.is_finite() || variance <= 0.0 {
            return Err(GeneSetError::numeric(
                "normal model",
                format!("mean {} and variance {} do not define a normal", mean, variance),
            ));
        }
        let std_dev = variance.sqrt();
        let dist = Normal::new(mean, std_dev)
            .map_err(|e| GeneSetError::numeric("normal model", e.to_string()))?;
        Ok(NormalModel {
            mean,
            std_dev,
            dist,
        })
    }

    /// Fit mean and sample variance from running sums of `n` values.
    pub fn from_sums(n: usize, sum: f64, sum_of_squares: f64) -> Result<Self> {
        if n < 2 {
            return Err(GeneSetError::numeric(
                "normal model",
                format!("cannot fit a normal to {} values", n),
            ));
        }
        let mean = sum / n as f64;
        Self::new(mean, variance_from_sums(n, sum, sum_of_squares))
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// `P(X >= x)` when `upper_tail`, otherwise `P(X <= x)`.
    pub fn tail(&self, x: f64, upper_tail: bool) -> f64 {
        if upper_tail {
            self.dist.sf(x)
        } else {
            self.dist.cdf(x)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_normal_tails() {
        let model = NormalModel::new(0.0, 1.0).unwrap();
        assert_relative_eq!(model.tail(0.0, true), 0.5, epsilon = 1e-12);
        assert_relative_eq!(model.tail(1.959964, true), 0.025, epsilon = 1e-6);
        assert_relative_eq!(model.tail(-1.959964, false), 0.025, epsilon = 1e-6);
    }

    #[test]
    fn test_from_sums() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sum: f64 = values.iter().sum();
        let ss: f64 = values.iter().map(|v| v * v).sum();
        let model = NormalModel::from_sums(values.len(), sum, ss).unwrap();
        assert_relative_eq!(model.mean(), 5.0);
        assert_relative_eq!(model.std_dev(), (32.0f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_variance_rejected() {
        assert!(NormalModel::new(1.0, 0.0).is_err());
        assert!(NormalModel::new(f64::NAN, 1.0).is_err());
        assert!(NormalModel::from_sums(1, 3.0, 9.0).is_err());
    }
}
