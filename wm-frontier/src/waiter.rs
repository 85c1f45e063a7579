//! Exponential backoff with multiplicative jitter (SPEC_FULL §11
//! "`Waiter` jitter"): the distilled spec only says "increment the
//! Waiter"; the original doubles the wait up to a ceiling and applies
//! +/-20% jitter, which this follows.

use std::time::Duration;

use rand::Rng;

const JITTER_FRACTION: f64 = 0.2;

/// Tracks the current politeness delay between fetches to one host,
/// doubling on error up to `max` and resetting to `base` on success.
pub struct Waiter {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Waiter {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, current: base }
    }

    /// The delay to sleep before the next fetch, jittered by +/-20% so
    /// that many workers backing off in lockstep don't retry in unison.
    #[must_use]
    pub fn get(&self) -> Duration {
        jitter(self.current)
    }

    /// Doubles the current wait, capped at `max`. Called after a
    /// transient/server error (spec.md §4.9 step 5).
    pub fn increment(&mut self) {
        let doubled = self.current.saturating_mul(2);
        self.current = doubled.min(self.max);
    }

    /// Resets to `base`. Called after a successful fetch.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_doubles_up_to_ceiling() {
        let mut waiter = Waiter::new(Duration::from_millis(100), Duration::from_millis(350));
        waiter.increment();
        assert_eq!(waiter.current, Duration::from_millis(200));
        waiter.increment();
        assert_eq!(waiter.current, Duration::from_millis(350)); // capped, not 400
    }

    #[test]
    fn reset_returns_to_base() {
        let mut waiter = Waiter::new(Duration::from_millis(100), Duration::from_secs(10));
        waiter.increment();
        waiter.reset();
        assert_eq!(waiter.current, Duration::from_millis(100));
    }

    #[test]
    fn jittered_value_stays_within_twenty_percent() {
        let waiter = Waiter::new(Duration::from_millis(1000), Duration::from_secs(10));
        for _ in 0..50 {
            let got = waiter.get().as_secs_f64();
            assert!((0.79..=1.21).contains(&got), "got {got}");
        }
    }
}
