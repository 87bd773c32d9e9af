//! Multiple testing correction of gene set p-values.

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::config::CorrectionMethod;
use crate::enrichment::utils::CancellationToken;
use crate::error::GeneSetError;
use crate::testing::{GeneSetResult, sorted_ids};

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

/// Apply Bonferroni correction to p-values
///
/// Multiplies each p-value by the number of tests, capping at 1.
///
/// # Example
/// ```
/// use single_geneset::testing::correction::bonferroni_correction;
/// let adjusted = bonferroni_correction(&[0.01, 0.03, 0.5]).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// assert_eq!(adjusted[2], 1.0);
/// ```
pub fn bonferroni_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len() as f64;
    Ok(p_values.iter().map(|&p| (p * n).min(1.0)).collect())
}

/// Apply the Benjamini-Hochberg false discovery rate adjustment
///
/// P-values are sorted ascending (ties keep input order) and the p-value at sorted
/// position `k` (1-based) becomes `p * N / k`. Neither a running minimum nor a cap at 1
/// is applied, so adjusted values may exceed 1 and are not guaranteed to be monotone in
/// p-value order.
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();

    let mut indexed_p_values: Vec<(usize, f64)> =
        p_values.iter().enumerate().map(|(i, &p)| (i, p)).collect();
    indexed_p_values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let mut adjusted_p_values = vec![0.0; n];
    // Walk from the worst p-value down, with `remaining` tests left
    for (remaining, &(orig_idx, p_val)) in (1..=n).rev().zip(indexed_p_values.iter().rev()) {
        adjusted_p_values[orig_idx] = p_val * n as f64 / remaining as f64;
    }

    Ok(adjusted_p_values)
}

/// Write Bonferroni or Benjamini-Hochberg corrected p-values into `results`.
///
/// Westfall-Young needs the scorer and is applied with [`westfall_young_step_down`].
pub fn correct_results(
    results: &mut HashMap<String, GeneSetResult>,
    method: CorrectionMethod,
) -> Result<()> {
    if results.is_empty() {
        return Ok(());
    }
    let ids = sorted_ids(results);
    let p_values: Vec<f64> = ids.iter().map(|id| results[id].p_value).collect();

    let corrected = match method {
        CorrectionMethod::Bonferroni => bonferroni_correction(&p_values)?,
        CorrectionMethod::BenjaminiHochberg => benjamini_hochberg_correction(&p_values)?,
        CorrectionMethod::WestfallYoung => {
            return Err(GeneSetError::UnsupportedOperation {
                reason: "Westfall-Young correction needs permutation replay".to_string(),
            }
            .into());
        }
    };

    for (id, value) in ids.iter().zip(corrected) {
        if let Some(result) = results.get_mut(id) {
            result.corrected_p_value = value;
        }
    }
    Ok(())
}

/// Westfall-Young max-T step-down correction.
///
/// `actual` holds the observed p-values ordered worst to best. `replay(trial)` must
/// return the p-values of the same gene sets, in the same order, recomputed under an
/// independent random permutation of the gene scores. Trials run in parallel; each
/// contributes a hit vector and the vectors are summed.
///
/// The returned corrected p-values are in the order of `actual` and never increase
/// from worst to best.
pub fn westfall_young_step_down<F>(
    actual: &[f64],
    trials: usize,
    replay: F,
    cancel: &CancellationToken,
) -> crate::error::Result<Vec<f64>>
where
    F: Fn(usize) -> crate::error::Result<Vec<f64>> + Sync,
{
    let n = actual.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if trials == 0 {
        return Err(GeneSetError::config("Westfall-Young trials must be positive"));
    }

    let counts = (0..trials)
        .into_par_iter()
        .map(|trial| {
            cancel.check()?;
            let permuted = replay(trial)?;
            if permuted.len() != n {
                return Err(GeneSetError::state(format!(
                    "permutation produced {} p-values for {} gene sets",
                    permuted.len(),
                    n
                )));
            }
            let mut hits = vec![0u64; n];
            let mut q = 1.0f64;
            for (j, (&perm_p, &actual_p)) in permuted.iter().zip(actual).enumerate() {
                q = q.min(perm_p);
                if q <= actual_p {
                    hits[j] += 1;
                }
            }
            Ok(hits)
        })
        .try_reduce(
            || vec![0u64; n],
            |mut acc, hits| {
                for (a, h) in acc.iter_mut().zip(hits) {
                    *a += h;
                }
                Ok(acc)
            },
        )?;

    debug!("Westfall-Young finished {} trials", trials);

    let trials = trials as f64;
    let mut corrected = vec![0.0; n];
    let mut previous = counts[n - 1] as f64 / trials;
    for j in (0..n).rev() {
        previous = previous.max(counts[j] as f64 / trials);
        corrected[j] = previous;
    }
    Ok(corrected)
}
