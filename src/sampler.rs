//! # Weighted Sampler
//! Weighted-random choice over a slice of items.
//!
//! - Negative weights count as zero.
//! - A weight slice shorter than the item slice is zero-padded; extra weights are ignored.
//! - If every weight is zero the draw is uniform over all items.
//!
//! Selection is inverse-CDF: draw `r` in `[0, total)` and return the first item whose
//! prefix sum is strictly greater than `r`.

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

/// Pick one item using the thread-local RNG.
pub fn pick<'a, T>(items: &'a [T], weights: &[i64]) -> Result<&'a T, SampleError> {
    pick_with(items, weights, &mut rand::rng())
}

/// Pick one item with a caller-provided RNG. Seed it for reproducible draws.
pub fn pick_with<'a, T, R: Rng>(
    items: &'a [T],
    weights: &[i64],
    rng: &mut R,
) -> Result<&'a T, SampleError> {
    if items.is_empty() {
        return Err(SampleError::InvalidInput("items cannot be empty"));
    }

    let prefix = prefix_sums(weights, items.len());
    let total = prefix.last().copied().unwrap_or(0);
    if total == 0 {
        return Ok(&items[rng.random_range(0..items.len())]);
    }

    let draw = rng.random_range(0..total);
    let idx = prefix.partition_point(|&p| p <= draw);
    Ok(&items[idx])
}

fn prefix_sums(weights: &[i64], n: usize) -> Vec<u64> {
    let mut acc = 0u64;
    (0..n)
        .map(|i| {
            let w = weights.get(i).copied().unwrap_or(0).max(0) as u64;
            acc = acc.saturating_add(w);
            acc
        })
        .collect()
}
