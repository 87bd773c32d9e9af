use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::MultiElementHandling;
use crate::data::GeneSetIndex;
use crate::error::{GeneSetError, Result};

/// Smallest p-value accepted before a -log10 transform
const MIN_TRANSFORMABLE_PVALUE: f64 = 1e-12;

/// How raw element scores are turned into analysis scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreTransform {
    /// Inputs are p-values; replace them by -log10(p)
    pub log_transform: bool,
    /// Without a log transform, larger inputs are more significant
    pub big_is_better: bool,
}

impl Default for ScoreTransform {
    fn default() -> Self {
        ScoreTransform {
            log_transform: true,
            big_is_better: false,
        }
    }
}

impl ScoreTransform {
    pub fn apply(&self, raw: f64) -> f64 {
        if self.log_transform {
            -raw.max(MIN_TRANSFORMABLE_PVALUE).log10()
        } else {
            raw
        }
    }

    /// Whether large transformed scores are the significant ones.
    pub fn upper_tail(&self) -> bool {
        self.log_transform || self.big_is_better
    }
}

/// Per-gene scores: the universe a run samples from.
///
/// Every score is finite. Genes keep the order in which they were supplied.
#[derive(Debug, Clone, Default)]
pub struct GeneScores {
    genes: Vec<String>,
    scores: Vec<f64>,
    element_counts: Vec<usize>,
    lookup: HashMap<String, usize>,
}

impl GeneScores {
    pub fn new<S: AsRef<str>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Result<Self> {
        let mut gene_scores = GeneScores::default();
        for (gene, score) in pairs {
            gene_scores.insert(gene.as_ref(), score, 1)?;
        }
        Ok(gene_scores)
    }

    fn insert(&mut self, gene: &str, score: f64, element_count: usize) -> Result<()> {
        if !score.is_finite() {
            return Err(GeneSetError::input(format!(
                "score for {} is not finite: {}",
                gene, score
            )));
        }
        if self.lookup.contains_key(gene) {
            return Err(GeneSetError::input(format!("gene {} was scored twice", gene)));
        }
        self.lookup.insert(gene.to_string(), self.genes.len());
        self.genes.push(gene.to_string());
        self.scores.push(score);
        self.element_counts.push(element_count);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn get(&self, gene: &str) -> Option<f64> {
        self.lookup.get(gene).map(|&i| self.scores[i])
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.lookup.contains_key(gene)
    }

    /// Number of elements that were collapsed into this gene; 0 if unscored.
    pub fn element_count(&self, gene: &str) -> usize {
        self.lookup
            .get(gene)
            .map_or(0, |&i| self.element_counts[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.genes
            .iter()
            .zip(self.scores.iter())
            .map(|(g, &s)| (g.as_str(), s))
    }

    /// Genes ordered best first.
    pub fn ranked_genes(&self, upper_tail: bool) -> Vec<&str> {
        let mut order: Vec<usize> = (0..self.genes.len()).collect();
        order.sort_by(|&a, &b| {
            let cmp = self.scores[a]
                .partial_cmp(&self.scores[b])
                .unwrap_or(Ordering::Equal);
            let cmp = if upper_tail { cmp.reverse() } else { cmp };
            cmp.then_with(|| self.genes[a].cmp(&self.genes[b]))
        });
        order.into_iter().map(|i| self.genes[i].as_str()).collect()
    }
}

/// Scores measured per element (probe), before collapsing to genes.
#[derive(Debug, Clone, Default)]
pub struct ElementScores {
    entries: Vec<(String, String, f64)>,
}

impl ElementScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: &str, gene: &str, score: f64) -> Result<()> {
        if !score.is_finite() {
            return Err(GeneSetError::input(format!(
                "score for element {} is not finite: {}",
                element, score
            )));
        }
        self.entries
            .push((element.to_string(), gene.to_string(), score));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transform and collapse element scores into the units a run analyses.
    ///
    /// With [`MultiElementHandling::KeepAll`] the units are the elements themselves and
    /// the returned index is re-expressed over elements; otherwise units are genes and
    /// the index is returned unchanged. Elements of genes unknown to `index` are dropped.
    pub fn collapse(
        &self,
        transform: ScoreTransform,
        handling: MultiElementHandling,
        index: &GeneSetIndex,
    ) -> Result<(GeneSetIndex, GeneScores)> {
        let upper_tail = transform.upper_tail();
        let known: Vec<&(String, String, f64)> = self
            .entries
            .iter()
            .filter(|(_, gene, _)| index.gene_index(gene).is_some())
            .collect();

        if handling == MultiElementHandling::KeepAll {
            let mut scores = GeneScores::default();
            let mut element_genes = Vec::with_capacity(known.len());
            for (element, gene, raw) in known {
                scores.insert(element, transform.apply(*raw), 1)?;
                element_genes.push((element.clone(), gene.clone()));
            }
            return Ok((index.expand_to_elements(&element_genes), scores));
        }

        let mut order: Vec<&str> = Vec::new();
        let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
        for (_, gene, raw) in known {
            let values = grouped.entry(gene.as_str()).or_insert_with(|| {
                order.push(gene.as_str());
                Vec::new()
            });
            values.push(transform.apply(*raw));
        }

        let mut scores = GeneScores::default();
        for gene in order {
            let values = &grouped[gene];
            let combined = match handling {
                MultiElementHandling::Mean => values.iter().sum::<f64>() / values.len() as f64,
                _ if upper_tail => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                _ => values.iter().copied().fold(f64::INFINITY, f64::min),
            };
            scores.insert(gene, combined, values.len())?;
        }

        Ok((index.clone(), scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GeneSetTerm;
    use approx::assert_relative_eq;

    fn index() -> GeneSetIndex {
        GeneSetIndex::from_gene_sets(
            ["g1", "g2"],
            vec![(GeneSetTerm::user_defined("S"), vec!["g1", "g2"])],
        )
        .unwrap()
    }

    fn elements() -> ElementScores {
        let mut scores = ElementScores::new();
        scores.push("p1", "g1", 0.01).unwrap();
        scores.push("p2", "g1", 0.1).unwrap();
        scores.push("p3", "g2", 0.5).unwrap();
        scores.push("p4", "nowhere", 0.001).unwrap();
        scores
    }

    #[test]
    fn test_log_transform() {
        let transform = ScoreTransform::default();
        assert_relative_eq!(transform.apply(0.01), 2.0, epsilon = 1e-12);
        assert_relative_eq!(transform.apply(0.0), 12.0, epsilon = 1e-12);
        assert!(transform.upper_tail());

        let raw = ScoreTransform {
            log_transform: false,
            big_is_better: false,
        };
        assert_eq!(raw.apply(0.3), 0.3);
        assert!(!raw.upper_tail());
    }

    #[test]
    fn test_collapse_best() {
        let (_, scores) = elements()
            .collapse(ScoreTransform::default(), MultiElementHandling::Best, &index())
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert_relative_eq!(scores.get("g1").unwrap(), 2.0, epsilon = 1e-12);
        assert_eq!(scores.element_count("g1"), 2);
        assert!(scores.get("nowhere").is_none());
    }

    #[test]
    fn test_collapse_best_lower_tail_takes_minimum() {
        let transform = ScoreTransform {
            log_transform: false,
            big_is_better: false,
        };
        let (_, scores) = elements()
            .collapse(transform, MultiElementHandling::Best, &index())
            .unwrap();
        assert_relative_eq!(scores.get("g1").unwrap(), 0.01);
    }

    #[test]
    fn test_collapse_mean() {
        let (_, scores) = elements()
            .collapse(ScoreTransform::default(), MultiElementHandling::Mean, &index())
            .unwrap();
        assert_relative_eq!(scores.get("g1").unwrap(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_collapse_keep_all() {
        let (expanded, scores) = elements()
            .collapse(
                ScoreTransform::default(),
                MultiElementHandling::KeepAll,
                &index(),
            )
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(expanded.num_genes(), 3);
        assert_eq!(expanded.set_size(0), 3);
        // three elements, but only two genes behind them
        assert_eq!(expanded.distinct_genes(expanded.set_members(0)), 2);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(GeneScores::new([("g1", f64::NAN)]).is_err());
        assert!(GeneScores::new([("g1", 1.0), ("g1", 2.0)]).is_err());
        let mut elements = ElementScores::new();
        assert!(elements.push("p", "g", f64::INFINITY).is_err());
    }

    #[test]
    fn test_ranked_genes() {
        let scores = GeneScores::new([("a", 1.0), ("b", 3.0), ("c", 2.0)]).unwrap();
        assert_eq!(scores.ranked_genes(true), vec!["b", "c", "a"]);
        assert_eq!(scores.ranked_genes(false), vec!["a", "c", "b"]);
    }
}
