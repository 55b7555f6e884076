//! Deterministic Shuffler.
//!
//! Fisher-Yates driven by `StdRng::seed_from_u64`, so the same (input, seed)
//! pair yields the same permutation across processes and runs for the pinned
//! rand version. Checkpoint resume depends on this: the cursor alone, plus
//! the seed and the filtered motion set, reconstructs the exact sequence.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `items` into the seed's permutation. An empty input yields an
/// empty output, not an error.
pub fn shuffle<T>(mut items: Vec<T>, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    items
}
