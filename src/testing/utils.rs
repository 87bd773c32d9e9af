use num_traits::Float;
use std::cmp::Ordering;

pub fn mean<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let sum = values.iter().fold(T::zero(), |acc, &v| acc + v);
    sum / T::from(values.len()).unwrap_or_else(T::nan)
}

/// Unbiased sample variance from running sums.
pub fn variance_from_sums<T: Float>(n: usize, sum: T, sum_of_squares: T) -> T {
    if n < 2 {
        return T::zero();
    }
    let n_t = T::from(n).unwrap_or_else(T::nan);
    (sum_of_squares - sum * sum / n_t) / (n_t - T::one())
}

/// The `k`-th smallest value (zero-based), `k` clamped to the last element.
///
/// Reorders `values`.
pub fn select_kth<T: Float>(values: &mut [T], k: usize) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let k = k.min(values.len() - 1);
    let (_, kth, _) =
        values.select_nth_unstable_by(k, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    *kth
}

/// Zero-based ranks with ties averaged.
///
/// With `descending` the largest value gets rank 0.
pub fn rank_transform<T: Float>(values: &[T], descending: bool) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let cmp = values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal);
        if descending { cmp.reverse() } else { cmp }
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let val = values[order[i]];
        let mut j = i + 1;

        // Find tied values
        while j < order.len() && values[order[j]] == val {
            j += 1;
        }

        let rank = (i + j - 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        i = j;
    }
    ranks
}

pub fn pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    sxy / (sxx * syy).sqrt()
}

/// Spearman rank correlation, ties averaged.
pub fn spearman_correlation(x: &[f64], y: &[f64]) -> f64 {
    let rx = rank_transform(x, false);
    let ry = rank_transform(y, false);
    pearson_correlation(&rx, &ry)
}
