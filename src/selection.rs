//! Yield-weighted subscription pick.
//!
//! Each enabled subscription weighs `yielded * 10_000 / total` of its scheme's
//! counters; unseen schemes weigh 0. If every weight is 0 the pick is uniform.

use rand::Rng;

use crate::config::SubscriptionConfig;
use crate::sampler::{self, SampleError};
use crate::stats::StatsTracker;

pub fn pick_subscription<'a, R: Rng>(
    subscriptions: &'a [SubscriptionConfig],
    stats: &StatsTracker,
    rng: &mut R,
) -> Result<&'a SubscriptionConfig, SampleError> {
    let enabled: Vec<&SubscriptionConfig> = subscriptions.iter().filter(|s| s.enabled).collect();
    let weights: Vec<i64> = enabled
        .iter()
        .map(|s| stats.get_yield_rate(&s.scheme_key()).selection_weight())
        .collect();
    sampler::pick_with(&enabled, &weights, rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn sub(url: &str, scheme: &str, enabled: bool) -> SubscriptionConfig {
        SubscriptionConfig {
            name: url.to_string(),
            url: url.to_string(),
            is_base64: false,
            enabled,
            scheme: scheme.to_string(),
            min_interval_secs: None,
            max_interval_secs: None,
        }
    }

    #[test]
    fn nothing_enabled_is_invalid_input() {
        let subs = vec![sub("https://a", "vmess", false)];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            pick_subscription(&subs, &StatsTracker::new(), &mut rng),
            Err(SampleError::InvalidInput(_))
        ));
    }

    #[test]
    fn disabled_and_unproductive_schemes_lose() {
        let stats = StatsTracker::new();
        stats.record_validation("vless", true);
        stats.record_validation("vmess", false);
        let subs = vec![
            sub("https://off", "vless", false),
            sub("https://vmess", "vmess", true),
            sub("https://vless", "vless", true),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let got = pick_subscription(&subs, &stats, &mut rng).unwrap();
            assert_eq!(got.url, "https://vless");
        }
    }

    #[test]
    fn empty_scheme_reads_mix_counters() {
        let stats = StatsTracker::new();
        stats.record_validation("mix", true);
        let subs = vec![sub("https://plain", "", true), sub("https://t", "trojan", true)];
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            assert_eq!(
                pick_subscription(&subs, &stats, &mut rng).unwrap().url,
                "https://plain"
            );
        }
    }
}
