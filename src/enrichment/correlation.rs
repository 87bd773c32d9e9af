//! Within-set expression correlation scoring.
//!
//! The raw score of a gene set is the mean absolute Pearson correlation over all pairs
//! of its genes' expression profiles. Squared expression values are computed once up
//! front so each pairwise correlation needs a single pass over the two rows. Missing
//! measurements are NaN and are skipped pairwise.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, Axis, Zip};

use crate::enrichment::null_distribution::ResamplingStatistic;
use crate::error::{GeneSetError, Result};

/// Expression profiles, one row per gene.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    genes: Vec<String>,
    lookup: HashMap<String, usize>,
    data: Array2<f64>,
}

impl ExpressionMatrix {
    pub fn new(genes: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if genes.len() != data.nrows() {
            return Err(GeneSetError::input(format!(
                "{} gene names for {} expression rows",
                genes.len(),
                data.nrows()
            )));
        }
        if data.ncols() < 2 {
            return Err(GeneSetError::input(
                "expression profiles need at least two samples",
            ));
        }
        let mut lookup = HashMap::with_capacity(genes.len());
        for (i, gene) in genes.iter().enumerate() {
            if lookup.insert(gene.clone(), i).is_some() {
                return Err(GeneSetError::input(format!(
                    "gene {} has two expression profiles",
                    gene
                )));
            }
        }
        Ok(ExpressionMatrix {
            genes,
            lookup,
            data,
        })
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.lookup.contains_key(gene)
    }

    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Correlation pool whose unit `i` is the profile of `universe[i]`.
    pub fn pool_for(&self, universe: &[String]) -> Result<CorrelationPool> {
        let mut rows = Vec::with_capacity(universe.len());
        for gene in universe {
            let row = self.lookup.get(gene).ok_or_else(|| {
                GeneSetError::input(format!("gene {} has no expression profile", gene))
            })?;
            rows.push(*row);
        }
        Ok(CorrelationPool::new(self.data.select(Axis(0), &rows)))
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationPool {
    data: Array2<f64>,
    self_squared: Array2<f64>,
}

impl CorrelationPool {
    pub fn new(data: Array2<f64>) -> Self {
        let self_squared = Zip::from(&data).par_map_collect(|&v| v * v);
        CorrelationPool { data, self_squared }
    }

    /// Pearson correlation of rows `a` and `b`; NaN when it cannot be computed.
    pub fn correlation(&self, a: usize, b: usize) -> f64 {
        let x = self.data.row(a);
        let y = self.data.row(b);
        let xx = self.self_squared.row(a);
        let yy = self.self_squared.row(b);
        correlation_with_squares(x, y, xx, yy)
    }

    /// Mean absolute correlation over all pairs of `rows`; NaN if no pair has one.
    pub fn mean_abs_correlation(&self, rows: &[usize]) -> f64 {
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, &a) in rows.iter().enumerate() {
            for &b in &rows[i + 1..] {
                let corr = self.correlation(a, b);
                if corr.is_nan() {
                    continue;
                }
                total += corr.abs();
                pairs += 1;
            }
        }
        if pairs == 0 {
            return f64::NAN;
        }
        (total / pairs as f64).clamp(0.0, 1.0)
    }
}

fn correlation_with_squares(
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    xx: ArrayView1<f64>,
    yy: ArrayView1<f64>,
) -> f64 {
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut used = 0usize;

    for j in 0..x.len() {
        let (xj, yj) = (x[j], y[j]);
        if xj.is_nan() || yj.is_nan() {
            continue;
        }
        sx += xj;
        sy += yj;
        sxy += xj * yj;
        sxx += xx[j];
        syy += yy[j];
        used += 1;
    }

    if used < 2 {
        return f64::NAN;
    }
    let n = used as f64;
    let denom = ((sxx - sx * sx / n) * (syy - sy * sy / n)).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    ((sxy - sx * sy / n) / denom).clamp(-1.0, 1.0)
}

impl ResamplingStatistic for CorrelationPool {
    fn universe_size(&self) -> usize {
        self.data.nrows()
    }

    fn score(&self, sample: &[usize], _scratch: &mut Vec<f64>) -> f64 {
        self.mean_abs_correlation(sample)
    }

    fn score_range(&self) -> (f64, f64) {
        (0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn pool() -> CorrelationPool {
        CorrelationPool::new(array![
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 4.0, 6.0, 8.0],
            [4.0, 3.0, 2.0, 1.0],
            [1.0, f64::NAN, 1.0, 1.0],
        ])
    }

    #[test]
    fn test_pairwise_correlation() {
        let pool = pool();
        assert_relative_eq!(pool.correlation(0, 1), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pool.correlation(0, 2), -1.0, epsilon = 1e-12);
        // constant profile
        assert!(pool.correlation(0, 3).is_nan());
    }

    #[test]
    fn test_mean_abs_correlation_skips_undefined_pairs() {
        let pool = pool();
        assert_relative_eq!(pool.mean_abs_correlation(&[0, 1, 2]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pool.mean_abs_correlation(&[0, 1, 3]), 1.0, epsilon = 1e-12);
        assert!(pool.mean_abs_correlation(&[0, 3]).is_nan());
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let pool = CorrelationPool::new(array![
            [1.0, 2.0, f64::NAN, 3.0],
            [2.0, 4.0, 100.0, 6.0],
        ]);
        assert_relative_eq!(pool.correlation(0, 1), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expression_matrix_pool() {
        let matrix = ExpressionMatrix::new(
            vec!["a".into(), "b".into(), "c".into()],
            array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0], [1.0, 3.0, 2.0]],
        )
        .unwrap();
        let pool = matrix
            .pool_for(&["c".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(pool.universe_size(), 2);
        assert_relative_eq!(pool.correlation(0, 1), 0.5, epsilon = 1e-12);
        assert!(matrix.pool_for(&["zzz".to_string()]).is_err());
    }

    #[test]
    fn test_expression_matrix_validation() {
        assert!(ExpressionMatrix::new(vec!["a".into()], array![[1.0], [2.0]]).is_err());
        assert!(ExpressionMatrix::new(vec!["a".into()], array![[1.0]]).is_err());
    }
}
