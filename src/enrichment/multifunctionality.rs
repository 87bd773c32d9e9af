//! Multifunctionality: how promiscuously genes and gene sets are annotated.
//!
//! A gene's multifunctionality is `sum(1 / (in_group * out_group))` over the non-empty
//! gene sets it belongs to, where `in_group` is the set size and `out_group` the
//! number of annotated genes outside it. Genes are rank-transformed to a relative rank
//! in `[0, 1]` (1 is most multifunctional) and a gene set's multifunctionality is the
//! ROC AUC of its members in that ranking.
//!
//! Scores are computed once, on demand, from an immutable [`GeneSetIndex`]; see
//! [`Multifunctionality::ensure_computed`].

use std::collections::HashMap;

use ndarray::Array1;
use tracing::{debug, warn};

use crate::data::{GeneScores, GeneSetIndex};
use crate::error::Result;
use crate::testing::inference::{auc_from_ranks, mann_whitney_upper_tail};
use crate::testing::regression::least_squares;
use crate::testing::utils::{rank_transform, spearman_correlation};

/// A lazily computed value: either not computed yet or ready.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Computed<T> {
    #[default]
    Uncomputed,
    Ready(T),
}

impl<T> Computed<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Computed::Ready(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Computed::Ready(value) => Some(value),
            Computed::Uncomputed => None,
        }
    }

    /// The value, computing it with `compute` first if needed.
    pub fn get_or_compute<F: FnOnce() -> T>(&mut self, compute: F) -> &T {
        if let Computed::Uncomputed = self {
            *self = Computed::Ready(compute());
        }
        match self {
            Computed::Ready(value) => value,
            Computed::Uncomputed => unreachable!("value was just computed"),
        }
    }
}

/// Multifunctionality of every gene and gene set of one index.
#[derive(Debug, Clone, PartialEq)]
pub struct MultifunctionalityScores {
    gene_lookup: HashMap<String, usize>,
    term_lookup: HashMap<String, usize>,
    num_annotated_genes: usize,
    gene_scores: Vec<Option<f64>>,
    gene_ranks: Vec<f64>,
    gene_rank_order: Vec<Option<f64>>,
    num_sets: Vec<usize>,
    term_scores: Vec<Option<f64>>,
    term_ranks: Vec<Option<f64>>,
}

impl MultifunctionalityScores {
    pub fn compute(index: &GeneSetIndex) -> Self {
        let num_genes = index.num_genes();
        let num_terms = index.num_terms();

        let mut annotated = vec![false; num_genes];
        for term_idx in 0..num_terms {
            for &gene_idx in index.set_members(term_idx) {
                annotated[gene_idx] = true;
            }
        }
        let num_annotated = annotated.iter().filter(|&&a| a).count();

        let mut gene_scores = vec![None; num_genes];
        let mut num_sets = vec![0usize; num_genes];
        for gene_idx in (0..num_genes).filter(|&g| annotated[g]) {
            let sets = index.gene_sets(gene_idx);
            num_sets[gene_idx] = sets.len();
            let mf: f64 = sets
                .iter()
                .filter_map(|&term_idx| {
                    let in_group = index.set_size(term_idx);
                    let out_group = num_annotated - in_group;
                    (out_group > 0).then(|| 1.0 / (in_group as f64 * out_group as f64))
                })
                .sum();
            gene_scores[gene_idx] = Some(mf);
        }

        // zero-based descending ranks of the annotated genes
        let annotated_idx: Vec<usize> = (0..num_genes).filter(|&g| annotated[g]).collect();
        let values: Vec<f64> = annotated_idx
            .iter()
            .filter_map(|&g| gene_scores[g])
            .collect();
        let ranks = rank_transform(&values, true);

        let mut gene_ranks = vec![0.0; num_genes];
        let mut gene_rank_order = vec![None; num_genes];
        for (&g, &r) in annotated_idx.iter().zip(&ranks) {
            gene_rank_order[g] = Some(r);
            gene_ranks[g] = (1.0 - (r + 1.0) / num_annotated as f64).max(0.0);
        }

        let mut term_scores = vec![None; num_terms];
        for (term_idx, score) in term_scores.iter_mut().enumerate() {
            let members = index.set_members(term_idx);
            if members.is_empty() || members.len() >= num_annotated {
                continue;
            }
            let member_ranks: Vec<f64> = members
                .iter()
                .filter_map(|&g| gene_rank_order[g].map(|r| r + 1.0))
                .collect();
            *score = Some(auc_from_ranks(&member_ranks, num_annotated));
        }

        let scored_terms: Vec<usize> = (0..num_terms)
            .filter(|&t| term_scores[t].is_some())
            .collect();
        let term_values: Vec<f64> = scored_terms
            .iter()
            .filter_map(|&t| term_scores[t])
            .collect();
        let term_rank_values = rank_transform(&term_values, true);
        let mut term_ranks = vec![None; num_terms];
        for (&t, &r) in scored_terms.iter().zip(&term_rank_values) {
            term_ranks[t] = Some((1.0 - (r + 1.0) / num_terms as f64).max(0.0));
        }

        debug!(
            "Multifunctionality computed for {} annotated genes and {} gene sets",
            num_annotated,
            scored_terms.len()
        );

        MultifunctionalityScores {
            gene_lookup: index
                .genes()
                .iter()
                .enumerate()
                .map(|(i, g)| (g.clone(), i))
                .collect(),
            term_lookup: index
                .terms()
                .iter()
                .enumerate()
                .map(|(i, t)| (t.id.clone(), i))
                .collect(),
            num_annotated_genes: num_annotated,
            gene_scores,
            gene_ranks,
            gene_rank_order,
            num_sets,
            term_scores,
            term_ranks,
        }
    }

    /// Number of genes annotated to at least one non-empty gene set.
    pub fn num_annotated_genes(&self) -> usize {
        self.num_annotated_genes
    }

    /// Raw multifunctionality score; 0 for unannotated or unknown genes.
    pub fn gene_score(&self, gene: &str) -> f64 {
        self.gene_lookup
            .get(gene)
            .and_then(|&g| self.gene_scores[g])
            .unwrap_or(0.0)
    }

    /// Relative rank in `[0, 1]`, 1 most multifunctional; 0 for unannotated genes.
    pub fn gene_rank(&self, gene: &str) -> f64 {
        self.gene_lookup
            .get(gene)
            .map_or(0.0, |&g| self.gene_ranks[g])
    }

    pub fn num_sets(&self, gene: &str) -> usize {
        self.gene_lookup.get(gene).map_or(0, |&g| self.num_sets[g])
    }

    /// AUC of the gene set's members in the gene multifunctionality ranking.
    pub fn term_score(&self, term_id: &str) -> Option<f64> {
        self.term_lookup
            .get(term_id)
            .and_then(|&t| self.term_scores[t])
    }

    /// Relative rank of the gene set, 1 most multifunctional.
    pub fn term_rank(&self, term_id: &str) -> Option<f64> {
        self.term_lookup
            .get(term_id)
            .and_then(|&t| self.term_ranks[t])
    }

    /// The gene of `genes` with the highest multifunctionality rank.
    pub fn most_multifunctional<'g>(&self, genes: &[&'g str]) -> Option<&'g str> {
        let mut best: Option<(&str, f64)> = None;
        for &gene in genes {
            let rank = self.gene_rank(gene);
            if best.is_none_or(|(_, r)| rank > r) {
                best = Some((gene, rank));
            }
        }
        best.map(|(gene, _)| gene)
    }

    /// Negated Spearman correlation between position in `ranked_genes` (best first)
    /// and gene multifunctionality. Positive when the top of the list is enriched for
    /// multifunctional genes. Unannotated genes are ignored.
    pub fn correlation_with_ranking(&self, ranked_genes: &[&str]) -> f64 {
        let values: Vec<f64> = ranked_genes
            .iter()
            .filter_map(|gene| self.gene_lookup.get(*gene).and_then(|&g| self.gene_scores[g]))
            .collect();
        let positions: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        -spearman_correlation(&positions, &values)
    }

    /// Negated Spearman correlation between position in `ranked_terms` (best first) and
    /// gene set multifunctionality. Positive when the top results are dominated by
    /// multifunctional gene sets. Sets without a multifunctionality score are ignored.
    pub fn correlation_with_term_ranking(&self, ranked_terms: &[&str]) -> f64 {
        let values: Vec<f64> = ranked_terms
            .iter()
            .filter_map(|term| self.term_score(term))
            .collect();
        let positions: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        -spearman_correlation(&positions, &values)
    }

    /// AUC of `genes` in the multifunctionality ranking and its Mann-Whitney p-value.
    pub fn enrichment(&self, genes: &[&str]) -> (f64, f64) {
        let ranks: Vec<f64> = genes
            .iter()
            .filter_map(|gene| {
                self.gene_lookup
                    .get(*gene)
                    .and_then(|&g| self.gene_rank_order[g])
                    .map(|r| r + 1.0)
            })
            .collect();
        let n = ranks.len();
        let auc = auc_from_ranks(&ranks, self.num_annotated_genes);
        let p = mann_whitney_upper_tail(auc, n, self.num_annotated_genes.saturating_sub(n));
        (auc, p)
    }

    /// Regress multifunctionality out of gene scores.
    ///
    /// Fits the scores (or, with `use_ranks`, their relative ranks) against gene
    /// multifunctionality rank by least squares and returns the residuals shifted back by
    /// the mean of the fitted values, so adjusted scores keep the location of the input.
    /// If the slope is negative there is no bias to remove and the input is returned
    /// unchanged.
    pub fn adjust_scores(&self, scores: &GeneScores, use_ranks: bool) -> Result<GeneScores> {
        let genes: Vec<&str> = scores.iter().map(|(g, _)| g).collect();
        let raw: Vec<f64> = scores.iter().map(|(_, s)| s).collect();
        let mfs: Array1<f64> = genes.iter().map(|g| self.gene_rank(g)).collect();

        let y: Array1<f64> = if use_ranks {
            let n = raw.len() as f64;
            rank_transform(&raw, false).into_iter().map(|r| r / n).collect()
        } else {
            Array1::from(raw)
        };

        let fit = match least_squares(mfs.view(), y.view()) {
            Ok(fit) => fit,
            Err(e) => {
                warn!("Multifunctionality correction skipped: {}", e);
                return Ok(scores.clone());
            }
        };
        debug!(
            "Multifunctionality regression: intercept {:.4}, slope {:.4}",
            fit.intercept, fit.slope
        );
        if fit.slope < 0.0 {
            warn!("Multifunctionality correction skipped: correlation is negative");
            return Ok(scores.clone());
        }

        let location = y.mean().unwrap_or(0.0);
        GeneScores::new(
            genes
                .into_iter()
                .zip(fit.residuals.iter().map(|&r| r + location)),
        )
    }
}

/// Multifunctionality of an index, computed on first use.
#[derive(Debug, Clone)]
pub struct Multifunctionality<'a> {
    index: &'a GeneSetIndex,
    scores: Computed<MultifunctionalityScores>,
}

impl<'a> Multifunctionality<'a> {
    pub fn new(index: &'a GeneSetIndex) -> Self {
        Multifunctionality {
            index,
            scores: Computed::Uncomputed,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.scores.is_ready()
    }

    pub fn ensure_computed(&mut self) -> &MultifunctionalityScores {
        let index = self.index;
        self.scores
            .get_or_compute(|| MultifunctionalityScores::compute(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GeneSetTerm;
    use approx::assert_relative_eq;

    // g1 is in every set, g6 in none
    fn index() -> GeneSetIndex {
        GeneSetIndex::from_gene_sets(
            ["g1", "g2", "g3", "g4", "g5", "g6"],
            vec![
                (GeneSetTerm::user_defined("A"), vec!["g1", "g2"]),
                (GeneSetTerm::user_defined("B"), vec!["g1", "g3"]),
                (GeneSetTerm::user_defined("C"), vec!["g1", "g4", "g5"]),
                (GeneSetTerm::user_defined("E"), Vec::<&str>::new()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_gene_scores() {
        let mf = MultifunctionalityScores::compute(&index());
        assert_eq!(mf.num_annotated_genes(), 5);
        // 1/(2*3) + 1/(2*3) + 1/(3*2)
        assert_relative_eq!(mf.gene_score("g1"), 0.5, epsilon = 1e-12);
        assert_relative_eq!(mf.gene_score("g2"), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(mf.gene_score("g6"), 0.0);
        assert_eq!(mf.num_sets("g1"), 3);
        assert_eq!(mf.num_sets("g6"), 0);
    }

    #[test]
    fn test_gene_ranks() {
        let mf = MultifunctionalityScores::compute(&index());
        // g1 is ranked first of 5: 1 - 1/5
        assert_relative_eq!(mf.gene_rank("g1"), 0.8, epsilon = 1e-12);
        // the other four tie at zero-based rank 2.5
        assert_relative_eq!(mf.gene_rank("g4"), 1.0 - 3.5 / 5.0, epsilon = 1e-12);
        assert_eq!(mf.gene_rank("g6"), 0.0);
        assert_eq!(mf.most_multifunctional(&["g3", "g1", "g6"]), Some("g1"));
        assert_eq!(mf.most_multifunctional(&[]), None);
    }

    #[test]
    fn test_term_scores() {
        let mf = MultifunctionalityScores::compute(&index());
        let a = mf.term_score("A").unwrap();
        let c = mf.term_score("C").unwrap();
        assert!((0.0..=1.0).contains(&a));
        // A holds g1 and one tied gene out of 5
        assert_relative_eq!(a, 1.0 - (1.0 + 3.5 - 3.0) / 6.0, epsilon = 1e-12);
        assert!(a > c);
        assert!(mf.term_score("E").is_none());
        assert!(mf.term_rank("A").unwrap() >= mf.term_rank("C").unwrap());
    }

    #[test]
    fn test_lazy_computation() {
        let index = index();
        let mut mf = Multifunctionality::new(&index);
        assert!(!mf.is_computed());
        let rank = mf.ensure_computed().gene_rank("g1");
        assert!(mf.is_computed());
        assert_eq!(mf.ensure_computed().gene_rank("g1"), rank);
    }

    #[test]
    fn test_correlation_sign() {
        let mf = MultifunctionalityScores::compute(&index());
        // the most multifunctional gene at the top of the list
        assert!(mf.correlation_with_ranking(&["g1", "g2", "g3", "g4", "g5"]) > 0.0);
        assert!(mf.correlation_with_ranking(&["g2", "g3", "g4", "g5", "g1"]) < 0.0);
    }

    #[test]
    fn test_term_correlation_sign() {
        let mf = MultifunctionalityScores::compute(&index());
        // A is more multifunctional than C; E has no score and is ignored
        assert!(mf.correlation_with_term_ranking(&["A", "E", "C"]) > 0.0);
        assert!(mf.correlation_with_term_ranking(&["C", "A", "E"]) < 0.0);
    }

    #[test]
    fn test_adjust_scores_removes_positive_trend() {
        let mf = MultifunctionalityScores::compute(&index());
        let scores = GeneScores::new([
            ("g1", 5.0),
            ("g2", 1.0),
            ("g3", 1.2),
            ("g4", 0.8),
            ("g5", 1.0),
        ])
        .unwrap();
        let adjusted = mf.adjust_scores(&scores, false).unwrap();
        assert_eq!(adjusted.len(), 5);
        assert!(adjusted.get("g1").unwrap() < 5.0);
        // residuals are shifted back to the input mean
        let total: f64 = adjusted.iter().map(|(_, s)| s).sum();
        assert_relative_eq!(total, 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_adjust_scores_negative_slope_is_noop() {
        let mf = MultifunctionalityScores::compute(&index());
        let scores = GeneScores::new([
            ("g1", -5.0),
            ("g2", 1.0),
            ("g3", 1.2),
            ("g4", 0.8),
            ("g5", 1.0),
        ])
        .unwrap();
        let adjusted = mf.adjust_scores(&scores, false).unwrap();
        assert_eq!(adjusted.get("g1"), Some(-5.0));
        assert_eq!(adjusted.get("g3"), Some(1.2));
    }
}
