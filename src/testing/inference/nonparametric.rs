use statrs::distribution::{ContinuousCDF, Normal};

/// Area under the ROC curve of a gene set from the ranks of its members.
///
/// `ranks` are 1-based with 1 the best gene of the whole list of `total` genes.
/// A set made of the top genes scores 1, one made of the bottom genes scores 0.
/// Degenerate inputs (empty set, or a set covering every gene) score 0.5.
pub fn auc_from_ranks(ranks: &[f64], total: usize) -> f64 {
    let n = ranks.len();
    if n == 0 || n >= total {
        return 0.5;
    }
    let m = (total - n) as f64;
    let n_f = n as f64;
    let rank_sum: f64 = ranks.iter().sum();
    let auc = 1.0 - (rank_sum - n_f * (n_f + 1.0) / 2.0) / (n_f * m);
    auc.clamp(0.0, 1.0)
}

/// Probability of an AUC at least this large for a random set of `n` out of `n + m`.
///
/// Normal approximation of the Mann-Whitney U statistic `U = auc * n * m`.
pub fn mann_whitney_upper_tail(auc: f64, n: usize, m: usize) -> f64 {
    if n == 0 || m == 0 {
        return 1.0;
    }
    let nm = (n * m) as f64;
    let mean_u = nm / 2.0;
    let var_u = nm * (n + m + 1) as f64 / 12.0;
    let u = auc * nm;
    let z = (u - mean_u) / var_u.sqrt();

    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.sf(z),
        Err(_) => 1.0,
    }
}
