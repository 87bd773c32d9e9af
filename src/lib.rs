//! # single-geneset
//!
//! A Rust library for gene set scoring, part of the single-rust ecosystem.
//!
//! Given per-gene scores (for example differential expression p-values) and a gene set
//! annotation, this crate scores every gene set and calibrates the scores into
//! p-values, either against resampled null distributions or against analytic nulls.
//!
//! ## Core Features
//!
//! - **Gene Score Resampling (GSR)**: mean, quantile or mean-above-quantile of a set's
//!   gene scores, compared against random sets of the same size
//! - **Correlation (CORR)**: mean within-set expression correlation against a resampled null
//! - **Over-Representation (ORA)** and **ROC** scoring with analytic nulls
//! - **Multiple Testing Correction**: Bonferroni, Benjamini-Hochberg and Westfall-Young
//! - **Multifunctionality**: annotation bias diagnostics and score adjustment
//!
//! ## Quick Start
//!
//! Build a [`data::GeneSetIndex`] and [`data::GeneScores`], pick a
//! [`config::RunConfiguration`] and execute a [`run::GeneSetPvalRun`].
//!
//! ```rust,no_run
//! use single_geneset::config::{Method, RunConfiguration};
//! use single_geneset::data::{GeneScores, GeneSetIndex, GeneSetTerm};
//! use single_geneset::run::GeneSetPvalRun;
//!
//! let index = GeneSetIndex::from_gene_sets(
//!     ["a", "b", "c", "d"],
//!     vec![(GeneSetTerm::user_defined("set1"), vec!["a", "b"])],
//! )?;
//! let scores = GeneScores::new([("a", 3.0), ("b", 2.5), ("c", 0.1), ("d", 0.4)])?;
//! let config = RunConfiguration::new(Method::Gsr).with_seed(1);
//! let results = GeneSetPvalRun::new(config, index, scores).run()?;
//! println!("{:?}", results.sorted_ids());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! - **[`data`]**: Gene set annotations and gene scores
//! - **[`testing`]**: Null models, regression and multiple testing correction
//! - **[`enrichment`]**: Gene set scoring methods and multifunctionality
//! - **[`run`]**: Orchestration of a complete analysis run

pub mod config;
pub mod data;
pub mod enrichment;
pub mod error;
pub mod run;
pub mod testing;

pub use config::{CorrectionMethod, Method, MultiElementHandling, RawScoreMethod, RunConfiguration};
pub use error::{GeneSetError, Result};
pub use run::{GeneSetPvalRun, RunResults, RunStage};
pub use testing::GeneSetResult;
