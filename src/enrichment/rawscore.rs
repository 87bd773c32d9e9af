//! Summary statistics that reduce the scores of a gene set to one raw score.

use crate::config::{RawScoreMethod, RunConfiguration};
use crate::testing::utils::{mean, select_kth};

/// Zero-based index of the `quantile`-th percentile among `n` sorted values.
pub fn quantile_index(quantile: u32, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let idx = (f64::from(quantile) / 100.0 * n as f64).floor() as usize;
    idx.min(n - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawScoreStatistic {
    method: RawScoreMethod,
    quantile: u32,
}

impl RawScoreStatistic {
    pub fn new(method: RawScoreMethod, quantile: u32) -> Self {
        RawScoreStatistic { method, quantile }
    }

    pub fn from_config(config: &RunConfiguration) -> Self {
        Self::new(config.raw_score_method, config.quantile)
    }

    pub fn method(&self) -> RawScoreMethod {
        self.method
    }

    /// Raw score of `values`; NaN when empty. `values` may be reordered.
    pub fn compute(&self, values: &mut [f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self.method {
            RawScoreMethod::Mean => mean(values),
            RawScoreMethod::Quantile => {
                let k = quantile_index(self.quantile, values.len());
                select_kth(values, k)
            }
            RawScoreMethod::MeanAboveQuantile => {
                let k = quantile_index(self.quantile, values.len());
                let cutoff = select_kth(values, k);
                let (sum, count) = values
                    .iter()
                    .filter(|&&v| v >= cutoff)
                    .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
                sum / count as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_index() {
        assert_eq!(quantile_index(50, 10), 5);
        assert_eq!(quantile_index(50, 5), 2);
        assert_eq!(quantile_index(100, 5), 4);
        assert_eq!(quantile_index(1, 5), 0);
    }

    #[test]
    fn test_mean() {
        let stat = RawScoreStatistic::new(RawScoreMethod::Mean, 50);
        assert_relative_eq!(stat.compute(&mut [1.0, 2.0, 6.0]), 3.0);
    }

    #[test]
    fn test_median() {
        let stat = RawScoreStatistic::new(RawScoreMethod::Quantile, 50);
        assert_eq!(stat.compute(&mut [5.0, 1.0, 3.0, 2.0, 4.0]), 3.0);
    }

    #[test]
    fn test_mean_above_quantile() {
        let stat = RawScoreStatistic::new(RawScoreMethod::MeanAboveQuantile, 50);
        // cutoff is 4.0 (index 2 of 4 sorted values)
        assert_relative_eq!(stat.compute(&mut [8.0, 1.0, 4.0, 2.0]), 6.0);
    }

    #[test]
    fn test_empty_is_nan() {
        let stat = RawScoreStatistic::new(RawScoreMethod::Mean, 50);
        assert!(stat.compute(&mut []).is_nan());
    }
}
