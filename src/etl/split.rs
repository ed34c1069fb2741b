//! Seeded two-stage train/validation/test split.

use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::EtlError;

/// Split proportions and seed. Defaults give 60/20/20.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Share of the whole dataset held out as test.
    pub test_size: f64,
    /// Share of the remainder held out as validation.
    pub val_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            val_size: 0.25,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Partitions {
    pub train: DataFrame,
    pub val: DataFrame,
    pub test: DataFrame,
}

/// `(kept, held_out)` row counts for one split stage.
pub fn split_sizes(n: usize, test_size: f64) -> (usize, usize) {
    let held_out = ((test_size * n as f64).ceil() as usize).min(n);
    (n - held_out, held_out)
}

/// Shuffle `0..n` and cut it into `(kept, held_out)` index lists.
///
/// The held-out rows are the head of the permutation; both lists keep the
/// shuffled order.
pub fn shuffled_indices(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (_, held_out) = split_sizes(n, test_size);
    let kept = indices.split_off(held_out);
    (kept, indices)
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame, EtlError> {
    let idx = IdxCa::from_vec("", rows.iter().map(|&i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}

/// Split a frame into `(kept, held_out)` frames.
pub fn train_test_split(
    df: &DataFrame,
    test_size: f64,
    seed: u64,
) -> Result<(DataFrame, DataFrame), EtlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(EtlError::InvalidSplit(format!(
            "test size must be in (0, 1), got {test_size}"
        )));
    }

    let (kept, held_out) = shuffled_indices(df.height(), test_size, seed);
    Ok((take_rows(df, &kept)?, take_rows(df, &held_out)?))
}

/// Carve off the test share, then split the rest into train and validation.
pub fn partition(df: &DataFrame, cfg: &SplitConfig) -> Result<Partitions, EtlError> {
    let (train_val, test) = train_test_split(df, cfg.test_size, cfg.seed)?;
    let (train, val) = train_test_split(&train_val, cfg.val_size, cfg.seed)?;
    Ok(Partitions { train, val, test })
}
