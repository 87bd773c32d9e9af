//! Run configuration for gene set scoring.
//!
//! A [`RunConfiguration`] is an immutable policy bundle for one analysis run. It is
//! validated once, before any resampling starts, and is never mutated by the core.

use serde::{Deserialize, Serialize};

use crate::data::Aspect;
use crate::error::{GeneSetError, Result};

/// Gene set scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Over-representation analysis with a hypergeometric tail
    Ora,
    /// Gene score resampling
    Gsr,
    /// Resampling of mean within-set expression correlation
    Corr,
    /// Area under the ROC curve of the set's gene ranks
    Roc,
}

/// Summary statistic used to reduce a set of gene scores to a raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawScoreMethod {
    Mean,
    Quantile,
    MeanAboveQuantile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionMethod {
    Bonferroni,
    BenjaminiHochberg,
    WestfallYoung,
}

/// How several elements (probes) measuring the same gene are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiElementHandling {
    /// Keep the best-scoring element
    Best,
    /// Average the element scores
    Mean,
    /// Treat every element as its own unit
    KeepAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub min_set_size: usize,
    pub max_set_size: usize,
    /// Resampling iterations per gene set size
    pub iterations: usize,
    pub method: Method,
    pub raw_score_method: RawScoreMethod,
    /// Percentile in (0, 100] used by the quantile statistics
    pub quantile: u32,
    pub correction_method: CorrectionMethod,
    /// Large raw scores are significant when true
    pub upper_tail: bool,
    pub use_multifunctionality_correction: bool,
    pub random_seed: Option<u64>,
    pub westfall_young_trials: usize,
    /// Score threshold for ORA, in the units of the (already transformed) scores
    pub gene_score_threshold: f64,
    /// Disable the normal approximation and the size speed-up
    pub always_use_empirical: bool,
    /// Aspects eligible for scoring; `None` scores every aspect except roots
    pub aspects: Option<Vec<Aspect>>,
    pub skip_redundant_sets: bool,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        RunConfiguration {
            min_set_size: 2,
            max_set_size: 100,
            iterations: 10_000,
            method: Method::Gsr,
            raw_score_method: RawScoreMethod::Mean,
            quantile: 50,
            correction_method: CorrectionMethod::BenjaminiHochberg,
            upper_tail: true,
            use_multifunctionality_correction: false,
            random_seed: None,
            westfall_young_trials: 10_000,
            gene_score_threshold: 3.0,
            always_use_empirical: false,
            aspects: None,
            skip_redundant_sets: false,
        }
    }
}

impl RunConfiguration {
    pub fn new(method: Method) -> Self {
        RunConfiguration {
            method,
            ..Default::default()
        }
    }

    pub fn with_set_size_bounds(mut self, min_set_size: usize, max_set_size: usize) -> Self {
        self.min_set_size = min_set_size;
        self.max_set_size = max_set_size;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_raw_score_method(mut self, raw_score_method: RawScoreMethod) -> Self {
        self.raw_score_method = raw_score_method;
        self
    }

    pub fn with_quantile(mut self, quantile: u32) -> Self {
        self.quantile = quantile;
        self
    }

    pub fn with_correction_method(mut self, correction_method: CorrectionMethod) -> Self {
        self.correction_method = correction_method;
        self
    }

    pub fn with_upper_tail(mut self, upper_tail: bool) -> Self {
        self.upper_tail = upper_tail;
        self
    }

    pub fn with_multifunctionality_correction(mut self, enabled: bool) -> Self {
        self.use_multifunctionality_correction = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_westfall_young_trials(mut self, trials: usize) -> Self {
        self.westfall_young_trials = trials;
        self
    }

    pub fn with_gene_score_threshold(mut self, threshold: f64) -> Self {
        self.gene_score_threshold = threshold;
        self
    }

    pub fn with_always_use_empirical(mut self, always: bool) -> Self {
        self.always_use_empirical = always;
        self
    }

    pub fn with_aspects(mut self, aspects: Vec<Aspect>) -> Self {
        self.aspects = Some(aspects);
        self
    }

    pub fn with_skip_redundant_sets(mut self, skip: bool) -> Self {
        self.skip_redundant_sets = skip;
        self
    }

    /// Whether gene sets of this aspect are eligible for scoring.
    pub fn scores_aspect(&self, aspect: Aspect) -> bool {
        if aspect == Aspect::Root {
            return false;
        }
        match &self.aspects {
            Some(allowed) => allowed.contains(&aspect),
            None => true,
        }
    }

    /// Check the configuration before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.min_set_size == 0 {
            return Err(GeneSetError::config("minimum gene set size must be at least 1"));
        }
        if self.max_set_size < self.min_set_size {
            return Err(GeneSetError::config(format!(
                "maximum gene set size {} is smaller than minimum {}",
                self.max_set_size, self.min_set_size
            )));
        }
        if self.quantile == 0 || self.quantile > 100 {
            return Err(GeneSetError::config(format!(
                "quantile must be in (0, 100], got {}",
                self.quantile
            )));
        }
        if !self.gene_score_threshold.is_finite() {
            return Err(GeneSetError::config("gene score threshold must be finite"));
        }

        match self.method {
            Method::Gsr | Method::Corr if self.iterations == 0 => {
                return Err(GeneSetError::config("iterations must be positive"));
            }
            Method::Corr if self.min_set_size < 2 => {
                return Err(GeneSetError::config(
                    "correlation scoring needs gene sets of at least 2 genes",
                ));
            }
            _ => {}
        }

        if self.correction_method == CorrectionMethod::WestfallYoung {
            if self.method != Method::Gsr {
                return Err(GeneSetError::UnsupportedOperation {
                    reason: format!(
                        "Westfall-Young correction is not supported for the {:?} method",
                        self.method
                    ),
                });
            }
            if self.westfall_young_trials == 0 {
                return Err(GeneSetError::config("Westfall-Young trials must be positive"));
            }
        }

        if self.use_multifunctionality_correction
            && !matches!(self.method, Method::Gsr | Method::Roc)
        {
            return Err(GeneSetError::config(format!(
                "multifunctionality correction is only available for GSR and ROC, not {:?}",
                self.method
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RunConfiguration::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = RunConfiguration::default().with_set_size_bounds(20, 10);
        assert!(matches!(
            config.validate(),
            Err(GeneSetError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_zero_iterations_rejected_for_resampling() {
        let config = RunConfiguration::new(Method::Gsr).with_iterations(0);
        assert!(config.validate().is_err());

        // ROC does not resample
        let config = RunConfiguration::new(Method::Roc).with_iterations(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_westfall_young_requires_gsr() {
        let config = RunConfiguration::new(Method::Roc)
            .with_correction_method(CorrectionMethod::WestfallYoung);
        assert!(matches!(
            config.validate(),
            Err(GeneSetError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_root_aspect_never_scored() {
        let config = RunConfiguration::default();
        assert!(!config.scores_aspect(Aspect::Root));
        assert!(config.scores_aspect(Aspect::BiologicalProcess));

        let config = config.with_aspects(vec![Aspect::MolecularFunction]);
        assert!(!config.scores_aspect(Aspect::BiologicalProcess));
        assert!(config.scores_aspect(Aspect::MolecularFunction));
    }
}
