//! Per-gene-set scoring.
//!
//! A [`GeneSetScorer`] pairs an active gene universe (a [`GeneSetIndex`] whose genes all
//! carry data) with one [`ScoringMethod`]. Each method variant owns only the state it
//! needs: a resampled null for GSR and CORR, threshold flags for ORA, gene ranks for ROC.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::{Method, RunConfiguration};
use crate::data::GeneSetIndex;
use crate::enrichment::correlation::CorrelationPool;
use crate::enrichment::histogram::Histogram;
use crate::enrichment::null_distribution::{NullDistributionGenerator, ScorePool};
use crate::enrichment::rawscore::RawScoreStatistic;
use crate::enrichment::utils::CancellationToken;
use crate::error::{GeneSetError, Result};
use crate::testing::GeneSetResult;
use crate::testing::inference::{auc_from_ranks, hypergeometric_upper_tail, mann_whitney_upper_tail};
use crate::testing::utils::rank_transform;

#[derive(Debug, Clone)]
pub enum ScoringMethod {
    /// Gene score resampling against a per-size null histogram
    Gsr {
        pool: ScorePool,
        histogram: Histogram,
        upper_tail: bool,
    },
    /// Mean within-set expression correlation against a resampled null
    Corr {
        pool: CorrelationPool,
        histogram: Histogram,
    },
    /// Over-representation of genes passing a score threshold
    Ora { passing: Vec<bool>, num_passing: usize },
    /// ROC AUC of the set's gene ranks; `ranks` are 1-based, best gene first
    Roc { ranks: Vec<f64> },
}

fn generator_for(
    config: &RunConfiguration,
    seed: u64,
    cancel: &CancellationToken,
) -> NullDistributionGenerator {
    NullDistributionGenerator::new(
        config.min_set_size,
        config.max_set_size,
        config.iterations,
        seed,
    )
    .with_always_use_empirical(config.always_use_empirical)
    .with_cancellation(cancel.clone())
}

impl ScoringMethod {
    /// GSR scoring of `scores` (one per universe gene), building the null histogram.
    pub fn gsr(
        config: &RunConfiguration,
        scores: Vec<f64>,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let pool = ScorePool::new(scores, RawScoreStatistic::from_config(config));
        let histogram = generator_for(config, seed, cancel).generate(&pool)?;
        Ok(ScoringMethod::Gsr {
            pool,
            histogram,
            upper_tail: config.upper_tail,
        })
    }

    /// CORR scoring over `pool`, building the null histogram of mean correlations.
    pub fn corr(
        config: &RunConfiguration,
        pool: CorrelationPool,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let histogram = generator_for(config, seed, cancel).generate(&pool)?;
        Ok(ScoringMethod::Corr { pool, histogram })
    }

    pub fn ora(scores: &[f64], threshold: f64, upper_tail: bool) -> Self {
        let passing: Vec<bool> = scores
            .iter()
            .map(|&s| if upper_tail { s >= threshold } else { s <= threshold })
            .collect();
        let num_passing = passing.iter().filter(|&&p| p).count();
        info!(
            "{} of {} genes pass the score threshold {}",
            num_passing,
            scores.len(),
            threshold
        );
        ScoringMethod::Ora {
            passing,
            num_passing,
        }
    }

    pub fn roc(scores: &[f64], upper_tail: bool) -> Self {
        let ranks = rank_transform(scores, upper_tail)
            .into_iter()
            .map(|r| r + 1.0)
            .collect();
        ScoringMethod::Roc { ranks }
    }

    pub fn method(&self) -> Method {
        match self {
            ScoringMethod::Gsr { .. } => Method::Gsr,
            ScoringMethod::Corr { .. } => Method::Corr,
            ScoringMethod::Ora { .. } => Method::Ora,
            ScoringMethod::Roc { .. } => Method::Roc,
        }
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        match self {
            ScoringMethod::Gsr { histogram, .. } | ScoringMethod::Corr { histogram, .. } => {
                Some(histogram)
            }
            _ => None,
        }
    }

    /// Whether p-values can be replayed under permuted scores without resampling.
    pub fn supports_fast_path(&self) -> bool {
        matches!(self, ScoringMethod::Gsr { .. })
    }

    /// Raw score and p-value of the genes at `members`; `None` if undefined.
    fn score_members(&self, members: &[usize], scratch: &mut Vec<f64>) -> Result<Option<(f64, f64)>> {
        let size = members.len();
        let scored = match self {
            ScoringMethod::Gsr {
                pool,
                histogram,
                upper_tail,
            } => {
                let raw = pool.score_with(pool.scores(), members, scratch);
                Some((raw, histogram.pvalue(size, raw, *upper_tail)?))
            }
            ScoringMethod::Corr { pool, histogram } => {
                let raw = pool.mean_abs_correlation(members);
                if raw.is_nan() {
                    None
                } else {
                    Some((raw, histogram.pvalue(size, raw, true)?))
                }
            }
            ScoringMethod::Ora {
                passing,
                num_passing,
            } => {
                let hits = members.iter().filter(|&&g| passing[g]).count();
                let p = hypergeometric_upper_tail(
                    passing.len() as u64,
                    *num_passing as u64,
                    size as u64,
                    hits as u64,
                )?;
                Some((hits as f64, p))
            }
            ScoringMethod::Roc { ranks } => {
                let total = ranks.len();
                scratch.clear();
                scratch.extend(members.iter().map(|&g| ranks[g]));
                let auc = auc_from_ranks(scratch, total);
                Some((auc, mann_whitney_upper_tail(auc, size, total - size)))
            }
        };
        Ok(scored)
    }
}

fn check_pvalue(p: f64, term_id: &str, raw: f64) -> Result<f64> {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return Err(GeneSetError::numeric(
            "gene set scoring",
            format!("raw score {} of {} yielded p-value {}", raw, term_id, p),
        ));
    }
    Ok(p)
}

pub struct GeneSetScorer<'a> {
    config: &'a RunConfiguration,
    index: &'a GeneSetIndex,
    element_counts: Vec<usize>,
    redundant: Vec<bool>,
    method: ScoringMethod,
}

impl<'a> GeneSetScorer<'a> {
    /// `element_counts[g]` is the number of elements measuring gene `g` of `index`.
    pub fn new(
        config: &'a RunConfiguration,
        index: &'a GeneSetIndex,
        element_counts: Vec<usize>,
        method: ScoringMethod,
    ) -> Self {
        let redundant = if config.skip_redundant_sets {
            index.redundant_sets()
        } else {
            vec![false; index.num_terms()]
        };
        GeneSetScorer {
            config,
            index,
            element_counts,
            redundant,
            method,
        }
    }

    pub fn method(&self) -> &ScoringMethod {
        &self.method
    }

    pub fn index(&self) -> &GeneSetIndex {
        self.index
    }

    /// Whether the gene set at `term_idx` passes the aspect, redundancy and size checks.
    pub fn is_scorable(&self, term_idx: usize) -> bool {
        let term = self.index.term(term_idx);
        if !self.config.scores_aspect(term.aspect) {
            return false;
        }
        if self.redundant[term_idx] {
            return false;
        }
        let size = self.index.set_size(term_idx);
        size >= self.config.min_set_size && size <= self.config.max_set_size
    }

    /// Score one gene set; `None` when it is skipped.
    pub fn score(&self, term_idx: usize) -> Result<Option<GeneSetResult>> {
        self.score_with_buffer(term_idx, &mut Vec::new())
    }

    fn score_with_buffer(
        &self,
        term_idx: usize,
        scratch: &mut Vec<f64>,
    ) -> Result<Option<GeneSetResult>> {
        if !self.is_scorable(term_idx) {
            return Ok(None);
        }
        let term = self.index.term(term_idx);
        let members = self.index.set_members(term_idx);

        let Some((raw, p)) = self.method.score_members(members, scratch)? else {
            debug!("Gene set {} has no defined raw score; skipped", term.id);
            return Ok(None);
        };
        let p = check_pvalue(p, &term.id, raw)?;
        let num_elements = members.iter().map(|&g| self.element_counts[g]).sum();

        Ok(Some(
            GeneSetResult::new(term.id.clone(), term.name.clone(), raw, p)
                .with_sizes(self.index.distinct_genes(members), num_elements),
        ))
    }

    /// Score every gene set of the index, checking `cancel` before each one.
    pub fn score_all(&self, cancel: &CancellationToken) -> Result<HashMap<String, GeneSetResult>> {
        let mut results = HashMap::new();
        let mut scratch = Vec::new();
        for term_idx in 0..self.index.num_terms() {
            cancel.check()?;
            if let Some(result) = self.score_with_buffer(term_idx, &mut scratch)? {
                results.insert(result.id.clone(), result);
            }
        }
        info!(
            "Scored {} of {} gene sets with {:?}",
            results.len(),
            self.index.num_terms(),
            self.method.method()
        );
        Ok(results)
    }

    /// P-values of `terms` recomputed after shuffling which gene carries which score.
    ///
    /// The null histogram is reused as is; only raw scores change. Only GSR supports
    /// this replay.
    pub fn permuted_pvalues<R: Rng + ?Sized>(&self, terms: &[usize], rng: &mut R) -> Result<Vec<f64>> {
        let ScoringMethod::Gsr {
            pool,
            histogram,
            upper_tail,
        } = &self.method
        else {
            return Err(GeneSetError::UnsupportedOperation {
                reason: format!(
                    "{:?} scoring has no fast re-scoring path",
                    self.method.method()
                ),
            });
        };

        let mut permuted = pool.scores().to_vec();
        permuted.shuffle(rng);

        let mut scratch = Vec::new();
        terms
            .iter()
            .map(|&term_idx| {
                let members = self.index.set_members(term_idx);
                let raw = pool.score_with(&permuted, members, &mut scratch);
                histogram.pvalue(members.len(), raw, *upper_tail)
            })
            .collect()
    }
}
