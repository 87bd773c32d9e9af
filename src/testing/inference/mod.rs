//! Null models used to turn raw gene set scores into p-values.
//!
//! - [`parametric`]: normal tail probabilities for converged resampling distributions
//! - [`nonparametric`]: rank-sum AUC and its Mann-Whitney significance
//! - [`discrete`]: hypergeometric over-representation tails

pub mod discrete;

pub mod parametric;

pub mod nonparametric;

pub use discrete::hypergeometric_upper_tail;
pub use nonparametric::{auc_from_ranks, mann_whitney_upper_tail};
pub use parametric::NormalModel;
