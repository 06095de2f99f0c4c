//! Randomized checks of the reconnect delay schedule.
//!
//! Many seeds and configurations are exercised so the jitter cannot hide an
//! ordering or bound violation behind one lucky draw.

use logsub::{Backoff, BackoffConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

fn random_config(rng: &mut StdRng) -> BackoffConfig {
    let base = rng.gen_range(1..=2_000u64);
    let cap = base + rng.gen_range(0..=120_000u64);
    BackoffConfig {
        base: Duration::from_millis(base),
        cap: Duration::from_millis(cap),
    }
}

#[test]
fn delays_never_decrease_and_never_exceed_cap() {
    let mut meta = StdRng::seed_from_u64(0x5eed);
    for seed in 0..500u64 {
        let config = random_config(&mut meta);
        let mut backoff = Backoff::with_rng(config, StdRng::seed_from_u64(seed));
        let mut prev = Duration::ZERO;
        for attempt in 0..40 {
            let delay = backoff.next_delay();
            assert!(delay <= config.cap, "seed {} attempt {}: {:?} > cap", seed, attempt, delay);
            assert!(delay >= prev, "seed {} attempt {}: {:?} < {:?}", seed, attempt, delay, prev);
            prev = delay;
        }
        assert_eq!(prev, config.cap);
    }
}

#[test]
fn first_delay_is_base_plus_bounded_jitter() {
    let mut meta = StdRng::seed_from_u64(7);
    for seed in 0..500u64 {
        let config = random_config(&mut meta);
        let mut backoff = Backoff::with_rng(config, StdRng::seed_from_u64(seed));
        let first = backoff.next_delay();
        let upper = (config.base + config.base / 4).min(config.cap);
        assert!(first >= config.base.min(config.cap));
        assert!(first <= upper + Duration::from_millis(1));
    }
}

#[test]
fn reset_restarts_the_schedule() {
    let config = BackoffConfig {
        base: Duration::from_millis(100),
        cap: Duration::from_secs(10),
    };
    for seed in 0..100u64 {
        let mut backoff = Backoff::with_rng(config, StdRng::seed_from_u64(seed));
        for _ in 0..6 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }
}

#[test]
fn same_seed_same_schedule() {
    let config = BackoffConfig::default();
    let mut a = Backoff::with_rng(config, StdRng::seed_from_u64(99));
    let mut b = Backoff::with_rng(config, StdRng::seed_from_u64(99));
    for _ in 0..20 {
        assert_eq!(a.next_delay(), b.next_delay());
    }
}
