use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Share of a partition held out for evaluation.
pub const TEST_FRACTION: f64 = 0.2;

/// Seed of the train/test shuffle, fixed so that a client's split is stable across rounds.
pub const SPLIT_SEED: u64 = 42;

/// Splits `0..len` into shuffled train and test indices.
///
/// The test split holds `ceil(len * test_fraction)` indices, but never all of them: a
/// partition of a single sample keeps it for training.
///
/// # Arguments
/// * `len` - The amount of samples.
/// * `test_fraction` - The share of samples to hold out, in `[0, 1)`.
/// * `seed` - The seed of the shuffle.
///
/// # Returns
/// The train and test indices, disjoint and together covering `0..len`.
pub fn train_test_split(len: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<_> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let test_len = ((len as f64 * test_fraction).ceil() as usize).min(len.saturating_sub(1));
    let train = indices.split_off(test_len);
    (train, indices)
}
