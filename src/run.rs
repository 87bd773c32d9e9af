//! Top-level sequencing of one gene set analysis run.
//!
//! A run moves through
//! `Init -> ScoringMethodDispatch -> [NullDistributionBuilt] -> PerSetScoring ->
//! MultipleTestCorrection -> [MultifunctionalityPass] -> RankAssignment -> Done`.
//! Any error moves it to `Failed` and no results are published.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{CorrectionMethod, Method, RunConfiguration};
use crate::data::{GeneScores, GeneSetIndex};
use crate::enrichment::correlation::ExpressionMatrix;
use crate::enrichment::multifunctionality::{Multifunctionality, MultifunctionalityScores};
use crate::enrichment::scorer::{GeneSetScorer, ScoringMethod};
use crate::enrichment::utils::{CancellationToken, sub_stream};
use crate::error::GeneSetError;
use crate::testing::correction::{correct_results, westfall_young_step_down};
use crate::testing::{GeneSetResult, populate_ranks, sorted_ids};

/// Offset separating the Westfall-Young permutation streams from the resampling streams
const PERMUTATION_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStage {
    Init,
    ScoringMethodDispatch,
    NullDistributionBuilt,
    PerSetScoring,
    MultipleTestCorrection,
    MultifunctionalityPass,
    RankAssignment,
    Done,
    Failed(String),
}

/// Run-level statistics reported for over-representation analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct OraSummary {
    /// Genes passing the score threshold
    pub num_above_threshold: usize,
    /// AUC of the passing genes in the multifunctionality ranking
    pub multifunctionality_enrichment: f64,
    pub multifunctionality_enrichment_pvalue: f64,
}

#[derive(Debug, Clone)]
pub struct RunResults {
    pub results: HashMap<String, GeneSetResult>,
    /// Correlation between the gene ranking and gene multifunctionality
    pub multifunctionality_correlation: Option<f64>,
    /// Correlation between the gene set ranking and gene set multifunctionality
    pub term_multifunctionality_correlation: Option<f64>,
    pub ora_summary: Option<OraSummary>,
    /// Seed the run used; pass it back to reproduce the run
    pub seed: u64,
}

impl RunResults {
    pub fn get(&self, id: &str) -> Option<&GeneSetResult> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Gene set identifiers, best first.
    pub fn sorted_ids(&self) -> Vec<String> {
        sorted_ids(&self.results)
    }

    /// Whether any gene set has a corrected p-value below `alpha`.
    pub fn has_significant(&self, alpha: f64) -> bool {
        self.results.values().any(|r| r.is_significant(alpha))
    }
}

/// The active universe of a run: the index restricted to genes with data, and that
/// data aligned to the index's gene order.
struct ActiveUniverse {
    index: GeneSetIndex,
    scores: Vec<f64>,
    element_counts: Vec<usize>,
}

impl ActiveUniverse {
    fn gene_scores(&self) -> crate::error::Result<GeneScores> {
        GeneScores::new(
            self.index
                .genes()
                .iter()
                .map(String::as_str)
                .zip(self.scores.iter().copied()),
        )
    }
}

pub struct GeneSetPvalRun {
    config: RunConfiguration,
    index: GeneSetIndex,
    scores: GeneScores,
    expression: Option<ExpressionMatrix>,
    cancel: CancellationToken,
    stage: RunStage,
}

impl GeneSetPvalRun {
    pub fn new(config: RunConfiguration, index: GeneSetIndex, scores: GeneScores) -> Self {
        GeneSetPvalRun {
            config,
            index,
            scores,
            expression: None,
            cancel: CancellationToken::new(),
            stage: RunStage::Init,
        }
    }

    /// Expression profiles, required by [`Method::Corr`].
    pub fn with_expression(mut self, expression: ExpressionMatrix) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn stage(&self) -> &RunStage {
        &self.stage
    }

    fn enter(&mut self, stage: RunStage) {
        info!("Run stage: {:?}", stage);
        self.stage = stage;
    }

    /// Execute the whole pipeline.
    ///
    /// Errors carry the stage they happened in as context; the underlying
    /// [`GeneSetError`] can be recovered with `downcast_ref`.
    pub fn run(&mut self) -> Result<RunResults> {
        self.enter(RunStage::Init);
        match self.execute() {
            Ok(results) => {
                self.enter(RunStage::Done);
                Ok(results)
            }
            Err(e) => {
                warn!("Run failed: {:#}", e);
                self.stage = RunStage::Failed(format!("{:#}", e));
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<RunResults> {
        self.config
            .validate()
            .context("Invalid run configuration")?;
        let seed = self.config.random_seed.unwrap_or_else(rand::random);
        info!("Starting {:?} run with seed {}", self.config.method, seed);

        self.enter(RunStage::ScoringMethodDispatch);
        let universe = self
            .active_universe()
            .context("Failed to prepare the gene universe")?;
        let method = self
            .build_method(&universe, &universe.scores, seed)
            .context("Failed to build the scoring method")?;
        if method.histogram().is_some() {
            self.enter(RunStage::NullDistributionBuilt);
        }

        self.enter(RunStage::PerSetScoring);
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let scorer = GeneSetScorer::new(
            &config,
            &universe.index,
            universe.element_counts.clone(),
            method,
        );
        let mut results = scorer
            .score_all(&cancel)
            .context("Failed to score gene sets")?;

        self.enter(RunStage::MultipleTestCorrection);
        apply_correction(
            &scorer,
            &mut results,
            config.correction_method,
            config.westfall_young_trials,
            seed,
            &cancel,
        )
        .context("Multiple test correction failed")?;

        let mut multifunctionality = Multifunctionality::new(&universe.index);
        let mf = multifunctionality.ensure_computed();
        for result in results.values_mut() {
            result.multifunctionality_rank = mf.term_rank(&result.id);
        }

        let multifunctionality_correlation = if config.method == Method::Corr {
            None
        } else {
            let gene_scores = universe.gene_scores()?;
            Some(mf.correlation_with_ranking(&gene_scores.ranked_genes(config.upper_tail)))
        };
        let ora_summary = match scorer.method() {
            ScoringMethod::Ora { passing, .. } => Some(ora_summary(&universe, passing, mf)),
            _ => None,
        };

        if config.use_multifunctionality_correction && !results.is_empty() {
            self.enter(RunStage::MultifunctionalityPass);
            self.multifunctionality_pass(&universe, mf, &mut results, seed)
                .context("Multifunctionality correction failed")?;
        }

        self.enter(RunStage::RankAssignment);
        let ranked = populate_ranks(&mut results);
        let ranked_terms: Vec<&str> = ranked.iter().map(String::as_str).collect();
        let term_multifunctionality_correlation =
            Some(mf.correlation_with_term_ranking(&ranked_terms)).filter(|c| c.is_finite());

        info!(
            "Run finished: {} gene sets scored, {} significant at 0.05",
            results.len(),
            results.values().filter(|r| r.is_significant(0.05)).count()
        );

        Ok(RunResults {
            results,
            multifunctionality_correlation,
            term_multifunctionality_correlation,
            ora_summary,
            seed,
        })
    }

    fn active_universe(&self) -> crate::error::Result<ActiveUniverse> {
        let index = if self.config.method == Method::Corr {
            let expression = self.expression.as_ref().ok_or_else(|| {
                GeneSetError::input("correlation scoring requires expression profiles")
            })?;
            self.index.prune(|gene| expression.contains(gene))
        } else {
            self.index.prune(|gene| self.scores.contains(gene))
        };
        if index.num_genes() == 0 {
            return Err(GeneSetError::input(
                "no annotated gene has data for this analysis",
            ));
        }
        info!(
            "Active universe: {} genes, {} gene sets",
            index.num_genes(),
            index.num_terms()
        );

        let scores = index
            .genes()
            .iter()
            .map(|g| self.scores.get(g).unwrap_or(0.0))
            .collect();
        let element_counts = index
            .genes()
            .iter()
            .map(|g| self.scores.element_count(g).max(1))
            .collect();
        Ok(ActiveUniverse {
            index,
            scores,
            element_counts,
        })
    }

    fn build_method(
        &self,
        universe: &ActiveUniverse,
        scores: &[f64],
        seed: u64,
    ) -> crate::error::Result<ScoringMethod> {
        let config = &self.config;
        match config.method {
            Method::Gsr => ScoringMethod::gsr(config, scores.to_vec(), seed, &self.cancel),
            Method::Corr => {
                let expression = self.expression.as_ref().ok_or_else(|| {
                    GeneSetError::input("correlation scoring requires expression profiles")
                })?;
                let pool = expression.pool_for(universe.index.genes())?;
                ScoringMethod::corr(config, pool, seed, &self.cancel)
            }
            Method::Ora => Ok(ScoringMethod::ora(
                scores,
                config.gene_score_threshold,
                config.upper_tail,
            )),
            Method::Roc => Ok(ScoringMethod::roc(scores, config.upper_tail)),
        }
    }

    /// Re-run scoring on multifunctionality-adjusted gene scores and record the
    /// adjusted p-values and rank changes on `results`.
    fn multifunctionality_pass(
        &self,
        universe: &ActiveUniverse,
        mf: &MultifunctionalityScores,
        results: &mut HashMap<String, GeneSetResult>,
        seed: u64,
    ) -> Result<()> {
        populate_ranks(results);

        let adjusted = mf.adjust_scores(&universe.gene_scores()?, false)?;
        let adjusted_scores: Vec<f64> = universe
            .index
            .genes()
            .iter()
            .map(|g| adjusted.get(g).unwrap_or(0.0))
            .collect();

        let method = self.build_method(universe, &adjusted_scores, seed)?;
        let scorer = GeneSetScorer::new(
            &self.config,
            &universe.index,
            universe.element_counts.clone(),
            method,
        );
        let mut adjusted_results = scorer.score_all(&self.cancel)?;

        let correction = match self.config.correction_method {
            CorrectionMethod::WestfallYoung => CorrectionMethod::BenjaminiHochberg,
            other => other,
        };
        correct_results(&mut adjusted_results, correction)?;
        populate_ranks(&mut adjusted_results);

        for (id, result) in results.iter_mut() {
            if let Some(adjusted) = adjusted_results.get(id) {
                result.mf_corrected_p_value = Some(adjusted.p_value);
                result.mf_corrected_fdr = Some(adjusted.corrected_p_value);
                result.mf_rank_delta = Some(result.rank as i64 - adjusted.rank as i64);
            }
        }
        Ok(())
    }
}

fn apply_correction(
    scorer: &GeneSetScorer<'_>,
    results: &mut HashMap<String, GeneSetResult>,
    method: CorrectionMethod,
    trials: usize,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<()> {
    if method != CorrectionMethod::WestfallYoung {
        return correct_results(results, method);
    }
    if results.is_empty() {
        return Ok(());
    }

    // worst first
    let mut order = sorted_ids(results);
    order.reverse();
    let terms = order
        .iter()
        .map(|id| {
            scorer
                .index()
                .term_index(id)
                .ok_or_else(|| GeneSetError::state(format!("unknown gene set {}", id)))
        })
        .collect::<crate::error::Result<Vec<usize>>>()?;
    let actual: Vec<f64> = order.iter().map(|id| results[id].p_value).collect();

    let permutation_seed = seed.wrapping_add(PERMUTATION_SEED_OFFSET);
    info!(
        "Westfall-Young correction of {} gene sets with {} permutations",
        terms.len(),
        trials
    );
    let corrected = westfall_young_step_down(
        &actual,
        trials,
        |trial| {
            let mut rng = sub_stream(permutation_seed, trial as u64);
            scorer.permuted_pvalues(&terms, &mut rng)
        },
        cancel,
    )?;

    for (id, value) in order.iter().zip(corrected) {
        if let Some(result) = results.get_mut(id) {
            result.corrected_p_value = value;
        }
    }
    Ok(())
}

fn ora_summary(
    universe: &ActiveUniverse,
    passing: &[bool],
    mf: &MultifunctionalityScores,
) -> OraSummary {
    let genes: Vec<&str> = universe
        .index
        .genes()
        .iter()
        .zip(passing)
        .filter(|&(_, &p)| p)
        .map(|(g, _)| g.as_str())
        .collect();
    let (auc, pvalue) = mf.enrichment(&genes);
    OraSummary {
        num_above_threshold: genes.len(),
        multifunctionality_enrichment: auc,
        multifunctionality_enrichment_pvalue: pvalue,
    }
}
