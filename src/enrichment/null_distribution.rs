//! Resampling null distributions for gene set raw scores.
//!
//! For every gene set size the generator draws random gene subsets (uniformly, without
//! replacement) from the scored universe, summarizes them with a
//! [`ResamplingStatistic`] and bins the results into a [`Histogram`].
//!
//! Two cost controls apply unless empirical distributions are forced:
//!
//! - Normal approximation: for sizes above [`MIN_SET_SIZE_FOR_ESTIMATION`], after
//!   [`MIN_ITERATIONS_FOR_ESTIMATION`] draws, every [`NORMAL_APPROX_SAMPLE_FREQUENCY`]
//!   draws a normal is fitted to the values so far. Once the upper 0.1% point of two
//!   successive fits moves by at most [`TOLERANCE`] standard deviations the size is
//!   frozen to that normal and no longer simulated.
//! - Speed-up: from [`SPEEDUP_SIZE_CUT`] on, only every few sizes are simulated (the
//!   step grows with the size); skipped sizes use the nearest smaller simulated size.
//!
//! Sizes are simulated in parallel. Each size draws from its own random stream derived
//! from the run seed, so results do not depend on thread scheduling.

use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::enrichment::histogram::Histogram;
use crate::enrichment::rawscore::RawScoreStatistic;
use crate::enrichment::utils::{CancellationToken, sub_stream};
use crate::error::{GeneSetError, Result};
use crate::testing::inference::NormalModel;

pub const MIN_ITERATIONS_FOR_ESTIMATION: usize = 1000;
pub const MIN_SET_SIZE_FOR_ESTIMATION: usize = 10;
pub const NORMAL_APPROX_SAMPLE_FREQUENCY: usize = 500;
pub const TOLERANCE: f64 = 0.01;
pub const SPEEDUP_SIZE_CUT: usize = 20;
pub const SPEEDUP_EXTRA_STEP: f64 = 0.2;

/// Standard normal quantile of the upper 0.1% tail
const NORMAL_DEVIATION_Z: f64 = 3.09;

/// A raw score that can be recomputed for arbitrary subsets of the universe.
pub trait ResamplingStatistic: Sync {
    /// Number of units that can be drawn.
    fn universe_size(&self) -> usize;

    /// Raw score of the units at `sample`; `scratch` is a reusable buffer.
    fn score(&self, sample: &[usize], scratch: &mut Vec<f64>) -> f64;

    /// Interval that contains every possible raw score.
    fn score_range(&self) -> (f64, f64);
}

/// Gene scores of the universe, summarized with a [`RawScoreStatistic`].
#[derive(Debug, Clone)]
pub struct ScorePool {
    scores: Vec<f64>,
    statistic: RawScoreStatistic,
}

impl ScorePool {
    pub fn new(scores: Vec<f64>, statistic: RawScoreStatistic) -> Self {
        ScorePool { scores, statistic }
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn statistic(&self) -> RawScoreStatistic {
        self.statistic
    }

    /// Raw score of `sample` under an alternative assignment of scores to units.
    pub fn score_with(&self, scores: &[f64], sample: &[usize], scratch: &mut Vec<f64>) -> f64 {
        scratch.clear();
        scratch.extend(sample.iter().map(|&i| scores[i]));
        self.statistic.compute(scratch)
    }
}

impl ResamplingStatistic for ScorePool {
    fn universe_size(&self) -> usize {
        self.scores.len()
    }

    fn score(&self, sample: &[usize], scratch: &mut Vec<f64>) -> f64 {
        self.score_with(&self.scores, sample, scratch)
    }

    fn score_range(&self) -> (f64, f64) {
        self.scores
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            })
    }
}

/// Resampling results for one gene set size.
struct SizeDistribution {
    size: usize,
    counts: Vec<f64>,
    normal: Option<NormalModel>,
    draws: usize,
}

#[derive(Debug, Clone)]
pub struct NullDistributionGenerator {
    min_size: usize,
    max_size: usize,
    iterations: usize,
    seed: u64,
    use_normal_approx: bool,
    use_speed_up: bool,
    cancel: CancellationToken,
}

impl NullDistributionGenerator {
    pub fn new(min_size: usize, max_size: usize, iterations: usize, seed: u64) -> Self {
        NullDistributionGenerator {
            min_size,
            max_size,
            iterations,
            seed,
            use_normal_approx: true,
            use_speed_up: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Disable both the normal approximation and the size speed-up.
    pub fn with_always_use_empirical(mut self, always: bool) -> Self {
        self.use_normal_approx = !always;
        self.use_speed_up = !always;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sizes that are simulated, ascending.
    pub fn simulated_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut size = self.min_size;
        while size <= self.max_size {
            sizes.push(size);
            if self.use_speed_up && size >= SPEEDUP_SIZE_CUT {
                size += (SPEEDUP_EXTRA_STEP * size as f64).floor() as usize;
            }
            size += 1;
        }
        sizes
    }

    /// Build and finalize the null histogram for `statistic` over `score_range`.
    pub fn generate_with_range<S: ResamplingStatistic>(
        &self,
        statistic: &S,
        score_range: (f64, f64),
    ) -> Result<Histogram> {
        if self.iterations == 0 {
            return Err(GeneSetError::config("iterations must be positive"));
        }
        if self.min_size == 0 || self.max_size < self.min_size {
            return Err(GeneSetError::config(format!(
                "invalid gene set size bounds [{}, {}]",
                self.min_size, self.max_size
            )));
        }
        let mut histogram =
            Histogram::new(self.min_size, self.max_size, score_range.0, score_range.1)?;

        let universe = statistic.universe_size();
        let sizes: Vec<usize> = self
            .simulated_sizes()
            .into_iter()
            .filter(|&size| size <= universe)
            .collect();
        info!(
            "Resampling {} gene set sizes from a universe of {} with up to {} iterations each",
            sizes.len(),
            universe,
            self.iterations
        );

        let distributions = sizes
            .par_iter()
            .map(|&size| self.simulate_size(statistic, &histogram, size))
            .collect::<Result<Vec<_>>>()?;

        for dist in distributions {
            match dist.normal {
                Some(model) => {
                    debug!(
                        "Size {}: converged to normal after {} draws (mean {:.4}, sd {:.4})",
                        dist.size,
                        dist.draws,
                        model.mean(),
                        model.std_dev()
                    );
                    histogram.set_normal(dist.size, model)?;
                }
                None => histogram.merge_counts(dist.size, &dist.counts)?,
            }
        }
        histogram.finalize()?;
        Ok(histogram)
    }

    /// Build the null histogram over the statistic's own score range.
    pub fn generate<S: ResamplingStatistic>(&self, statistic: &S) -> Result<Histogram> {
        self.generate_with_range(statistic, statistic.score_range())
    }

    fn simulate_size<S: ResamplingStatistic>(
        &self,
        statistic: &S,
        histogram: &Histogram,
        size: usize,
    ) -> Result<SizeDistribution> {
        let mut rng = sub_stream(self.seed, size as u64);
        let mut deck: Vec<usize> = (0..statistic.universe_size()).collect();
        let mut scratch = Vec::with_capacity(size);
        let mut counts = vec![0.0; histogram.num_bins()];

        let mut draws = 0usize;
        let mut sum = 0.0;
        let mut sum_of_squares = 0.0;
        let mut old_deviation = f64::MAX;

        for j in 0..self.iterations {
            self.cancel.check()?;

            let (sample, _) = deck.partial_shuffle(&mut rng, size);
            let value = statistic.score(sample, &mut scratch);
            if !value.is_finite() {
                continue;
            }
            counts[histogram.bin_index(value)] += 1.0;
            draws += 1;
            sum += value;
            sum_of_squares += value * value;

            if self.use_normal_approx
                && j > MIN_ITERATIONS_FOR_ESTIMATION
                && size > MIN_SET_SIZE_FOR_ESTIMATION
                && j % NORMAL_APPROX_SAMPLE_FREQUENCY == 0
            {
                let Ok(model) = NormalModel::from_sums(draws, sum, sum_of_squares) else {
                    continue;
                };
                let deviation = model.mean() + NORMAL_DEVIATION_Z * model.std_dev();
                if (old_deviation - deviation).abs() <= TOLERANCE * model.std_dev() {
                    return Ok(SizeDistribution {
                        size,
                        counts,
                        normal: Some(model),
                        draws,
                    });
                }
                old_deviation = deviation;
            }
        }

        Ok(SizeDistribution {
            size,
            counts,
            normal: None,
            draws,
        })
    }
}
