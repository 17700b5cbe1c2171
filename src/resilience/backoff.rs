//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Delay schedule for one retry loop.
///
/// The base delay starts at `initial_delay`, is multiplied by
/// `backoff_multiplier` after every attempt and is capped at `max_delay`.
/// With jitter enabled, up to 10% of the base delay is added. Emitted delays
/// never exceed `max_delay` and never decrease.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    last: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        let max = config.max_delay();
        Self {
            current: config.initial_delay().min(max),
            max,
            multiplier: config.backoff_multiplier.max(1.0),
            jitter: config.jitter,
            last: Duration::ZERO,
        }
    }

    /// Delay to wait before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let mut delay = base;

        if self.jitter {
            let jitter_range = base.as_millis() as u64 / 10;
            if jitter_range > 0 {
                delay += Duration::from_millis(rand::thread_rng().gen_range(0..jitter_range));
            }
        }

        let delay = delay.min(self.max).max(self.last);
        self.last = delay;

        self.current = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);

        delay
    }
}
