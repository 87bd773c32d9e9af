//! Per-size null distributions of raw gene set scores.
//!
//! A [`Histogram`] holds one binned distribution for every gene set size in
//! `[min_size, max_size]`. Simulated values are accumulated with [`Histogram::update`]
//! (or merged in bulk from per-worker arrays), sizes whose resampling converged can be
//! frozen to an analytic [`NormalModel`], and [`Histogram::finalize`] turns the bins
//! into upper-tail cumulative fractions. Only a finalized histogram answers p-value
//! queries.

use tracing::warn;

use crate::error::{GeneSetError, Result};
use crate::testing::inference::NormalModel;

/// Smallest p-value handed out; the largest is `1 - SMALL`.
pub const SMALL: f64 = 1e-12;

/// Number of bins spanning the score range.
pub const NUM_BINS: usize = 500;

#[derive(Debug, Clone)]
pub struct Histogram {
    min_size: usize,
    max_size: usize,
    min_score: f64,
    max_score: f64,
    bin_size: f64,
    bins: Vec<Vec<f64>>,
    normals: Vec<Option<NormalModel>>,
    finalized: bool,
}

impl Histogram {
    pub fn new(min_size: usize, max_size: usize, min_score: f64, max_score: f64) -> Result<Self> {
        if max_size < min_size {
            return Err(GeneSetError::config(format!(
                "maximum gene set size {} is smaller than minimum {}",
                max_size, min_size
            )));
        }
        if !min_score.is_finite() || !max_score.is_finite() || max_score <= min_score {
            return Err(GeneSetError::config(format!(
                "score range [{}, {}] cannot be binned",
                min_score, max_score
            )));
        }
        let num_sizes = max_size - min_size + 1;
        Ok(Histogram {
            min_size,
            max_size,
            min_score,
            max_score,
            bin_size: (max_score - min_score) / NUM_BINS as f64,
            bins: vec![vec![0.0; NUM_BINS]; num_sizes],
            normals: vec![None; num_sizes],
            finalized: false,
        })
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn score_range(&self) -> (f64, f64) {
        (self.min_score, self.max_score)
    }

    pub fn num_bins(&self) -> usize {
        NUM_BINS
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Bin holding `value`; values outside the score range land in the end bins.
    pub fn bin_index(&self, value: f64) -> usize {
        let bin = ((value - self.min_score) / self.bin_size).floor();
        if bin.is_nan() || bin < 0.0 {
            0
        } else {
            (bin as usize).min(NUM_BINS - 1)
        }
    }

    fn slot(&self, size: usize) -> Result<usize> {
        if size < self.min_size || size > self.max_size {
            return Err(GeneSetError::input(format!(
                "gene set size {} is outside [{}, {}]",
                size, self.min_size, self.max_size
            )));
        }
        Ok(size - self.min_size)
    }

    fn ensure_open(&self, size: usize) -> Result<usize> {
        if self.finalized {
            return Err(GeneSetError::state("histogram is already finalized"));
        }
        let slot = self.slot(size)?;
        if self.normals[slot].is_some() {
            return Err(GeneSetError::state(format!(
                "distribution for size {} was frozen to a normal model",
                size
            )));
        }
        Ok(slot)
    }

    /// Record one simulated raw score for gene sets of `size`.
    pub fn update(&mut self, size: usize, value: f64) -> Result<()> {
        let slot = self.ensure_open(size)?;
        let bin = self.bin_index(value);
        self.bins[slot][bin] += 1.0;
        Ok(())
    }

    /// Add a whole bin array for `size`, as accumulated by one resampling worker.
    pub fn merge_counts(&mut self, size: usize, counts: &[f64]) -> Result<()> {
        let slot = self.ensure_open(size)?;
        if counts.len() != NUM_BINS {
            return Err(GeneSetError::input(format!(
                "expected {} bins, got {}",
                NUM_BINS,
                counts.len()
            )));
        }
        for (bin, &count) in self.bins[slot].iter_mut().zip(counts) {
            *bin += count;
        }
        Ok(())
    }

    /// Replace the empirical distribution of `size` by an analytic normal.
    pub fn set_normal(&mut self, size: usize, model: NormalModel) -> Result<()> {
        let slot = self.ensure_open(size)?;
        self.normals[slot] = Some(model);
        Ok(())
    }

    pub fn normal(&self, size: usize) -> Option<&NormalModel> {
        self.slot(size)
            .ok()
            .and_then(|slot| self.normals[slot].as_ref())
    }

    /// Whether `size` has an analytic model or a non-empty empirical distribution.
    pub fn has_distribution(&self, size: usize) -> bool {
        match self.slot(size) {
            Ok(slot) => self.normals[slot].is_some() || self.bins[slot].iter().any(|&c| c > 0.0),
            Err(_) => false,
        }
    }

    /// Convert every size's bins to upper-tail cumulative fractions, in place.
    ///
    /// After this, bin `j` holds the fraction of simulated values in bin `j` or above.
    /// Sizes with no simulated values stay empty and are answered from the nearest
    /// smaller size.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(GeneSetError::state("histogram was finalized twice"));
        }
        for bins in self.bins.iter_mut() {
            let total: f64 = bins.iter().sum();
            if total <= 0.0 {
                continue;
            }
            let mut running = 0.0;
            for bin in bins.iter_mut().rev() {
                running += *bin;
                *bin = running / total;
            }
        }
        self.finalized = true;
        Ok(())
    }

    /// Largest size no bigger than `size` that has a distribution.
    pub fn nearest_usable_size(&self, size: usize) -> Result<usize> {
        let mut candidate = size.min(self.max_size);
        while candidate >= self.min_size {
            if self.has_distribution(candidate) {
                return Ok(candidate);
            }
            if candidate == 0 {
                break;
            }
            candidate -= 1;
        }
        Err(GeneSetError::MissingDistribution { size })
    }

    /// P-value of `raw_score` for a gene set of `size`, in `[SMALL, 1 - SMALL]`.
    ///
    /// Scores outside the histogram range are clamped to the nearest bound.
    pub fn pvalue(&self, size: usize, raw_score: f64, upper_tail: bool) -> Result<f64> {
        if !self.finalized {
            return Err(GeneSetError::state(
                "histogram must be finalized before computing p-values",
            ));
        }
        if raw_score.is_nan() {
            return Err(GeneSetError::numeric(
                "histogram lookup",
                format!("raw score for size {} is NaN", size),
            ));
        }

        let mut score = raw_score;
        if score < self.min_score || score > self.max_score {
            warn!(
                "Raw score {} is outside the histogram range [{}, {}]; clamping",
                raw_score, self.min_score, self.max_score
            );
            score = score.clamp(self.min_score, self.max_score);
        }

        let used = self.nearest_usable_size(size)?;
        let slot = used - self.min_size;

        let p = match &self.normals[slot] {
            Some(model) => model.tail(score, upper_tail),
            None => {
                let upper = self.bins[slot][self.bin_index(score)];
                if upper_tail { upper } else { 1.0 - upper }
            }
        };

        if !(-SMALL..=1.0 + SMALL).contains(&p) {
            return Err(GeneSetError::numeric(
                "histogram lookup",
                format!("p-value {} for raw score {} at size {}", p, raw_score, size),
            ));
        }
        Ok(p.clamp(SMALL, 1.0 - SMALL))
    }
}
