use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

use single_geneset::config::{Method, RunConfiguration};
use single_geneset::data::{GeneScores, GeneSetIndex, GeneSetTerm};
use single_geneset::enrichment::histogram::SMALL;
use single_geneset::enrichment::{Histogram, MultifunctionalityScores};
use single_geneset::testing::correction::{benjamini_hochberg_correction, bonferroni_correction};
use single_geneset::testing::inference::auc_from_ranks;
use single_geneset::GeneSetError;

#[cfg(test)]
mod quick_test {
    use super::*;

    #[test]
    fn check_histogram_pvalues_stay_in_bounds() {
        // All simulated scores sit at 0.25, so anything above is never reached
        // and anything at the bottom is always exceeded.
        let mut hist = Histogram::new(1, 3, 0.0, 1.0).unwrap();
        for _ in 0..100 {
            hist.update(1, 0.25).unwrap();
        }
        hist.finalize().unwrap();

        let high = hist.pvalue(1, 0.9, true).unwrap();
        let low = hist.pvalue(1, 0.0, true).unwrap();
        assert_eq!(high, SMALL);
        assert_eq!(low, 1.0 - SMALL);

        // sizes 2 and 3 were never simulated and fall back to size 1
        assert_eq!(hist.pvalue(3, 0.9, true).unwrap(), SMALL);
        // out-of-range scores are clamped, not rejected
        assert_eq!(hist.pvalue(1, 7.5, true).unwrap(), SMALL);
    }

    #[test]
    fn check_histogram_requires_finalize() {
        let mut hist = Histogram::new(1, 1, 0.0, 1.0).unwrap();
        hist.update(1, 0.5).unwrap();
        assert!(matches!(
            hist.pvalue(1, 0.5, true),
            Err(GeneSetError::InvalidState { .. })
        ));
        hist.finalize().unwrap();
        assert!(hist.finalize().is_err());
        assert!(hist.update(1, 0.5).is_err());
    }

    #[test]
    fn check_auc_extremes_and_random_set() {
        let best: Vec<f64> = (1..=50).map(f64::from).collect();
        let worst: Vec<f64> = (951..=1000).map(f64::from).collect();
        assert_relative_eq!(auc_from_ranks(&best, 1000), 1.0);
        assert_relative_eq!(auc_from_ranks(&worst, 1000), 0.0);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut ranks: Vec<f64> = (1..=1000).map(f64::from).collect();
        ranks.shuffle(&mut rng);
        let auc = auc_from_ranks(&ranks[..50], 1000);
        println!("AUC of a random set of 50: {}", auc);
        assert!((auc - 0.5).abs() < 0.15);
    }

    #[test]
    fn check_corrections() {
        let p = [0.01, 0.2, 0.5];
        let bonferroni = bonferroni_correction(&p).unwrap();
        assert_relative_eq!(bonferroni[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(bonferroni[1], 0.6, epsilon = 1e-12);
        assert_eq!(bonferroni[2], 1.0);

        // p * N / k with k the 1-based rank
        let bh = benjamini_hochberg_correction(&p).unwrap();
        assert_relative_eq!(bh[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(bh[1], 0.3, epsilon = 1e-12);
        assert_relative_eq!(bh[2], 0.5, epsilon = 1e-12);

        assert!(bonferroni_correction(&[]).is_err());
        assert!(benjamini_hochberg_correction(&[0.2, 1.5]).is_err());
    }

    fn nested_index() -> GeneSetIndex {
        // g1 is in every set, g6 in none
        GeneSetIndex::from_gene_sets(
            ["g1", "g2", "g3", "g4", "g5", "g6"],
            vec![
                (GeneSetTerm::user_defined("A"), vec!["g1", "g2", "g3", "g4"]),
                (GeneSetTerm::user_defined("B"), vec!["g1", "g2", "g3"]),
                (GeneSetTerm::user_defined("C"), vec!["g1", "g2"]),
                (GeneSetTerm::user_defined("D"), vec!["g1", "g5"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn check_multifunctionality_ordering() {
        let mf = MultifunctionalityScores::compute(&nested_index());
        assert_eq!(mf.num_annotated_genes(), 5);
        assert_eq!(mf.num_sets("g1"), 4);
        assert!(mf.gene_score("g1") > mf.gene_score("g2"));
        assert!(mf.gene_rank("g1") > mf.gene_rank("g4"));
        assert_eq!(mf.gene_score("g6"), 0.0);
        assert_eq!(mf.gene_rank("g6"), 0.0);
        assert_eq!(mf.most_multifunctional(&["g4", "g1", "g3"]), Some("g1"));
    }

    #[test]
    fn check_multifunctionality_adjustment_removes_linear_bias() {
        let mf = MultifunctionalityScores::compute(&nested_index());
        let genes = ["g1", "g2", "g3", "g4", "g5", "g6"];

        // scores that are an exact increasing function of multifunctionality
        let biased = GeneScores::new(genes.iter().map(|&g| (g, 2.0 * mf.gene_rank(g) + 1.0))).unwrap();
        let adjusted = mf.adjust_scores(&biased, false).unwrap();
        // the trend is gone and every gene sits at the input mean
        let input_mean = biased.iter().map(|(_, s)| s).sum::<f64>() / genes.len() as f64;
        for gene in genes {
            assert_relative_eq!(adjusted.get(gene).unwrap(), input_mean, epsilon = 1e-9);
        }

        // a negative relationship is left alone
        let inverse = GeneScores::new(genes.iter().map(|&g| (g, -mf.gene_rank(g)))).unwrap();
        let untouched = mf.adjust_scores(&inverse, false).unwrap();
        for gene in genes {
            assert_eq!(untouched.get(gene), inverse.get(gene));
        }
    }

    #[test]
    fn check_uncorrelated_scores_are_left_as_is() {
        // Scores drawn independently of the annotations, centred well away from zero
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let genes: Vec<String> = (0..2000).map(|i| format!("U{:04}", i)).collect();
        let sets: Vec<(GeneSetTerm, Vec<String>)> = (0..300)
            .map(|k| {
                let mut members = genes.clone();
                members.shuffle(&mut rng);
                members.truncate(5 + k % 46);
                (GeneSetTerm::user_defined(format!("SET{}", k)), members)
            })
            .collect();
        let index = GeneSetIndex::from_gene_sets(&genes, sets).unwrap();
        let mf = MultifunctionalityScores::compute(&index);

        let normal = Normal::new(5.0, 1.0).unwrap();
        let scores = GeneScores::new(genes.iter().map(|g| (g.as_str(), normal.sample(&mut rng)))).unwrap();
        let adjusted = mf.adjust_scores(&scores, false).unwrap();

        let mut largest_shift: f64 = 0.0;
        let mut total_shift = 0.0;
        for (gene, score) in scores.iter() {
            let shift = adjusted.get(gene).unwrap() - score;
            largest_shift = largest_shift.max(shift.abs());
            total_shift += shift;
        }
        println!("Largest multifunctionality adjustment: {}", largest_shift);
        assert!(largest_shift < 0.5);
        assert_relative_eq!(total_shift, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn check_configuration_from_json() {
        let config: RunConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunConfiguration::default());

        let config: RunConfiguration =
            serde_json::from_str(r#"{"method": "Roc", "min_set_size": 5, "random_seed": 9}"#).unwrap();
        assert_eq!(config.method, Method::Roc);
        assert_eq!(config.min_set_size, 5);
        assert_eq!(config.random_seed, Some(9));
        assert!(config.validate().is_ok());

        let json = serde_json::to_string(&RunConfiguration::new(Method::Ora)).unwrap();
        let back: RunConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, Method::Ora);
    }
}
