use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Reconnect delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry of a failure streak.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with bounded additive jitter.
///
/// The n-th delay of a streak is `min(cap, base * 2^n + jitter)` where the
/// jitter is drawn uniformly from `[0, base * 2^n / 4]`. Because doubling
/// outgrows a quarter of jitter, successive delays never decrease until they
/// reach the cap, and then stay there.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Use a caller-provided generator, e.g. a seeded one for reproducible
    /// delays.
    pub fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            config,
            attempt: 0,
            rng,
        }
    }

    pub fn config(&self) -> BackoffConfig {
        self.config
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the next delay and advance the streak.
    pub fn next_delay(&mut self) -> Duration {
        let cap_us = self.config.cap.as_micros().min(u64::MAX as u128) as u64;
        // A zero or sub-microsecond base still has to grow.
        let base_us = (self.config.base.as_micros() as u64).max(1).min(cap_us);
        // 2^32 * base already overflows any sane cap
        let factor = 1u64 << self.attempt.min(32);
        let exp_us = base_us.saturating_mul(factor).min(cap_us);
        let jitter_us = if exp_us >= cap_us {
            0
        } else {
            self.rng.gen_range(0..=exp_us / 4)
        };
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_micros(exp_us.saturating_add(jitter_us).min(cap_us))
    }

    /// Start a new streak from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
