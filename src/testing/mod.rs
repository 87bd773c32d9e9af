use std::cmp::Ordering;
use std::collections::HashMap;

pub mod correction;
pub mod inference;
pub mod regression;

pub mod utils;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneSetResult {
    /// Gene set identifier
    pub id: String,
    /// Gene set display name
    pub name: String,
    /// Raw score of the gene set (mean, quantile, correlation, AUC, or hit count)
    pub score: f64,
    /// The p-value of the raw score
    pub p_value: f64,
    /// The p-value after multiple testing correction
    pub corrected_p_value: f64,
    /// Number of scored genes in the set
    pub num_genes: usize,
    /// Number of elements (probes) mapped to those genes
    pub num_elements: usize,
    /// 1 is the best gene set; 0 until ranks are assigned
    pub rank: usize,
    /// `(rank - 1) / N`
    pub relative_rank: f64,
    /// Relative multifunctionality rank of the gene set (1 is most multifunctional)
    pub multifunctionality_rank: Option<f64>,
    /// P-value after regressing multifunctionality out of the gene scores
    pub mf_corrected_p_value: Option<f64>,
    /// Corrected p-value of the multifunctionality-adjusted pass
    pub mf_corrected_fdr: Option<f64>,
    /// `rank - adjusted rank`; positive when the set ranks worse after adjustment
    pub mf_rank_delta: Option<i64>,
}

impl GeneSetResult {
    /// Create a new result with a raw score and p-value
    pub fn new(id: impl Into<String>, name: impl Into<String>, score: f64, p_value: f64) -> Self {
        GeneSetResult {
            id: id.into(),
            name: name.into(),
            score,
            p_value,
            corrected_p_value: p_value,
            num_genes: 0,
            num_elements: 0,
            rank: 0,
            relative_rank: 1.0,
            multifunctionality_rank: None,
            mf_corrected_p_value: None,
            mf_corrected_fdr: None,
            mf_rank_delta: None,
        }
    }

    /// Add gene and element counts to the result
    pub fn with_sizes(mut self, num_genes: usize, num_elements: usize) -> Self {
        self.num_genes = num_genes;
        self.num_elements = num_elements;
        self
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.corrected_p_value < alpha
    }
}

/// Order by p-value, ties broken by identifier.
pub fn compare_results(a: &GeneSetResult, b: &GeneSetResult) -> Ordering {
    a.p_value
        .partial_cmp(&b.p_value)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// Identifiers of the results, best first.
pub fn sorted_ids(results: &HashMap<String, GeneSetResult>) -> Vec<String> {
    let mut sorted: Vec<&GeneSetResult> = results.values().collect();
    sorted.sort_by(|a, b| compare_results(a, b));
    sorted.into_iter().map(|r| r.id.clone()).collect()
}

/// Fill in ranks and relative ranks; returns the identifiers best first.
pub fn populate_ranks(results: &mut HashMap<String, GeneSetResult>) -> Vec<String> {
    let sorted = sorted_ids(results);
    let n = sorted.len() as f64;
    for (i, id) in sorted.iter().enumerate() {
        if let Some(result) = results.get_mut(id) {
            result.rank = i + 1;
            result.relative_rank = i as f64 / n;
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> HashMap<String, GeneSetResult> {
        [("b", 0.01), ("a", 0.01), ("c", 0.5), ("d", 0.001)]
            .into_iter()
            .map(|(id, p)| (id.to_string(), GeneSetResult::new(id, id, 0.0, p)))
            .collect()
    }

    #[test]
    fn test_ranks_break_ties_by_id() {
        let mut results = results();
        let sorted = populate_ranks(&mut results);
        assert_eq!(sorted, vec!["d", "a", "b", "c"]);
        assert_eq!(results["d"].rank, 1);
        assert_eq!(results["a"].rank, 2);
        assert_eq!(results["b"].rank, 3);
        assert_eq!(results["c"].rank, 4);
        assert_eq!(results["d"].relative_rank, 0.0);
        assert_eq!(results["c"].relative_rank, 0.75);
    }

    #[test]
    fn test_significance_uses_corrected_pvalue() {
        let mut result = GeneSetResult::new("x", "x", 1.0, 0.001);
        assert!(result.is_significant(0.05));
        result.corrected_p_value = 0.2;
        assert!(!result.is_significant(0.05));
    }
}
