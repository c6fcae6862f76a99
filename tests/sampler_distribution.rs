// tests/sampler_distribution.rs
use rand::{rngs::StdRng, SeedableRng};
use subscription_poller::sampler::{pick, pick_with, SampleError};

const TRIALS: usize = 10_000;

fn frequencies(weights: &[i64], n: usize, seed: u64) -> Vec<f64> {
    let items: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut hits = vec![0usize; n];
    for _ in 0..TRIALS {
        hits[*pick_with(&items, weights, &mut rng).unwrap()] += 1;
    }
    hits.into_iter().map(|h| h as f64 / TRIALS as f64).collect()
}

#[test]
fn all_zero_weights_are_uniform() {
    let f = frequencies(&[0, 0, 0], 3, 42);
    for share in f {
        assert!((share - 1.0 / 3.0).abs() < 0.03, "share {share}");
    }
}

#[test]
fn frequencies_follow_weights() {
    let f = frequencies(&[1, 3, 6], 3, 7);
    assert!((f[0] - 0.1).abs() < 0.02, "{f:?}");
    assert!((f[1] - 0.3).abs() < 0.02, "{f:?}");
    assert!((f[2] - 0.6).abs() < 0.02, "{f:?}");
}

#[test]
fn negative_and_missing_weights_count_as_zero() {
    // item 0 negative, item 2 has no weight at all
    let f = frequencies(&[-50, 10], 3, 11);
    assert_eq!(f[0], 0.0);
    assert_eq!(f[1], 1.0);
    assert_eq!(f[2], 0.0);
}

#[test]
fn single_positive_weight_always_wins() {
    let f = frequencies(&[0, 0, 9_999, 0], 4, 3);
    assert_eq!(f, vec![0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn empty_items_are_rejected() {
    let items: [u8; 0] = [];
    assert!(matches!(pick(&items, &[1, 2]), Err(SampleError::InvalidInput(_))));
}
