//! Gene set scoring methods.
//!
//! This module turns gene scores (or expression profiles) and gene set annotations into
//! per-gene-set raw scores and p-values.
//!
//! ## Available Methods
//!
//! - **GSR** (`null_distribution`, `histogram`, `rawscore`): gene score resampling, with
//!   the raw score of a set compared against random sets of the same size
//! - **CORR** (`correlation`): mean within-set expression correlation, against a
//!   resampled null
//! - **ORA** (`scorer`): over-representation of genes passing a score threshold
//! - **ROC** (`scorer`): area under the ROC curve of the set's gene ranks
//!
//! [`multifunctionality`] measures annotation bias and can regress it out of gene scores.

pub mod correlation;
pub mod histogram;
pub mod multifunctionality;
pub mod null_distribution;
pub mod rawscore;
pub mod scorer;
pub mod utils;

pub use correlation::{CorrelationPool, ExpressionMatrix};
pub use histogram::Histogram;
pub use multifunctionality::{Computed, Multifunctionality, MultifunctionalityScores};
pub use null_distribution::{NullDistributionGenerator, ResamplingStatistic, ScorePool};
pub use rawscore::RawScoreStatistic;
pub use scorer::{GeneSetScorer, ScoringMethod};
pub use utils::CancellationToken;
