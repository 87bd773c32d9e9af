use statrs::distribution::{DiscreteCDF, Hypergeometric};

use crate::error::{GeneSetError, Result};

/// `P(X >= observed)` for `X ~ Hypergeometric(population, successes, draws)`.
///
/// For over-representation: `population` scored genes, `successes` of them pass the
/// threshold, the set draws `draws` genes and `observed` of those pass.
pub fn hypergeometric_upper_tail(
    population: u64,
    successes: u64,
    draws: u64,
    observed: u64,
) -> Result<f64> {
    if successes > population || draws > population {
        return Err(GeneSetError::input(format!(
            "hypergeometric with {} successes and {} draws from {}",
            successes, draws, population
        )));
    }
    if observed == 0 {
        return Ok(1.0);
    }
    let dist = Hypergeometric::new(population, successes, draws)
        .map_err(|e| GeneSetError::numeric("hypergeometric tail", e.to_string()))?;
    Ok(dist.sf(observed - 1).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_hits_is_one() {
        assert_eq!(hypergeometric_upper_tail(100, 10, 5, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_all_hits() {
        // choose 3 of 3 successes out of 10: 1 / C(10,3)
        let p = hypergeometric_upper_tail(10, 3, 3, 3).unwrap();
        assert_relative_eq!(p, 1.0 / 120.0, epsilon = 1e-10);
    }

    #[test]
    fn test_single_hit_tail() {
        // P(X >= 1) = 1 - C(8,2)/C(10,2)
        let p = hypergeometric_upper_tail(10, 2, 2, 1).unwrap();
        assert_relative_eq!(p, 1.0 - 28.0 / 45.0, epsilon = 1e-10);
    }

    #[test]
    fn test_invalid_counts() {
        assert!(hypergeometric_upper_tail(10, 11, 2, 1).is_err());
    }
}
