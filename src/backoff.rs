//! Exponential backoff with jitter for reconnection delays.

use std::time::Duration;

use rand::Rng;

use crate::EventConfig;

/// Reconnection delay policy: doubles on consecutive failures up to a
/// maximum, resets to the minimum after any success.
///
/// Jitter is drawn fresh from `[0, jitter)` each time a delay is emitted and
/// is never folded back into the stored delay, so the deterministic part of
/// the sequence stays exactly `min, 2*min, 4*min, ..., max`.
///
/// Owned by a single control loop; not meant for concurrent callers.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
    jitter: Duration,
}

impl Backoff {
    /// Creates a backoff policy from the event channel configuration.
    #[must_use]
    pub fn new(config: &EventConfig) -> Self {
        Self {
            current: config.min_delay,
            min: config.min_delay,
            max: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Returns the next delay and advances the policy.
    pub fn next(&mut self) -> Duration {
        let base = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }

    /// Restores the delay to the configured minimum.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_ms: u64, max_ms: u64, jitter_ms: u64) -> EventConfig {
        EventConfig {
            min_delay: Duration::from_millis(min_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: Duration::from_millis(jitter_ms),
        }
    }

    #[test]
    fn test_doubles_until_max_without_jitter() {
        let mut backoff = Backoff::new(&config(100, 800, 0));
        assert_eq!(backoff.next(), Duration::from_millis(100));
        assert_eq!(backoff.next(), Duration::from_millis(200));
        assert_eq!(backoff.next(), Duration::from_millis(400));
        assert_eq!(backoff.next(), Duration::from_millis(800));
        // Pinned at max from here on
        assert_eq!(backoff.next(), Duration::from_millis(800));
    }

    #[test]
    fn test_reset_restores_minimum() {
        let mut backoff = Backoff::new(&config(100, 800, 0));
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_bounds() {
        let mut backoff = Backoff::new(&config(100, 800, 50));
        for expected_base in [100u64, 200, 400, 800, 800] {
            let delay = backoff.next().as_millis() as u64;
            assert!(delay >= expected_base, "delay {delay} below base {expected_base}");
            assert!(delay < expected_base + 50, "delay {delay} exceeds jitter window");
        }
    }

    #[test]
    fn test_jitter_not_accumulated() {
        // Many emissions at max must stay within one jitter window of max,
        // proving jitter never folds into the stored delay.
        let mut backoff = Backoff::new(&config(100, 400, 50));
        for _ in 0..20 {
            backoff.next();
        }
        let delay = backoff.next().as_millis() as u64;
        assert!(delay < 450);
    }

    #[test]
    fn test_delays_non_decreasing_in_base() {
        let mut backoff = Backoff::new(&config(100, 3200, 0));
        let mut previous = Duration::ZERO;
        for _ in 0..8 {
            let delay = backoff.next();
            assert!(delay >= previous);
            previous = delay;
        }
    }
}
