use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{GeneSetError, Result};

/// Members of row `j` of a compressed sparse layout.
pub(crate) fn getset<'a>(cnct: &'a [usize], offsets: &[usize], j: usize) -> &'a [usize] {
    &cnct[offsets[j]..offsets[j + 1]]
}

/// Independent, reproducible random stream `stream` derived from `seed`.
pub(crate) fn sub_stream(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with [`GeneSetError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GeneSetError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_getset() {
        let cols = [0, 2, 1, 3, 4];
        let offsets = [0, 2, 2, 5];
        assert_eq!(getset(&cols, &offsets, 0), &[0, 2]);
        assert!(getset(&cols, &offsets, 1).is_empty());
        assert_eq!(getset(&cols, &offsets, 2), &[1, 3, 4]);
    }

    #[test]
    fn test_sub_streams_are_reproducible_and_distinct() {
        let a: Vec<u32> = (0..8).map(|_| sub_stream(7, 1).gen_range(0..1000)).collect();
        let mut first = sub_stream(7, 1);
        let mut again = sub_stream(7, 1);
        let mut other = sub_stream(7, 2);
        let x: Vec<u32> = (0..8).map(|_| first.gen_range(0..u32::MAX)).collect();
        let y: Vec<u32> = (0..8).map(|_| again.gen_range(0..u32::MAX)).collect();
        let z: Vec<u32> = (0..8).map(|_| other.gen_range(0..u32::MAX)).collect();
        assert_eq!(x, y);
        assert_ne!(x, z);
        assert!(a.iter().all(|&v| v < 1000));
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check(), Err(GeneSetError::Cancelled));
    }
}
