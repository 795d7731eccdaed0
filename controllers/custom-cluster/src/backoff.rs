//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconcile passes. The sequence is counted in
//! minutes and grows more slowly than exponential backoff:
//! 1m, 1m, 2m, 3m, 5m, 8m, 10m (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max_minutes`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value in minutes (for reset)
    min_minutes: u64,
    /// Previous backoff value in minutes
    prev_minutes: u64,
    /// Current backoff value in minutes
    current_minutes: u64,
    /// Maximum backoff value in minutes
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a backoff bounded by `min_minutes` and `max_minutes`.
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Returns the current delay and advances the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = Duration::from_secs(self.current_minutes * 60);

        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);

        result
    }

    /// The capped delay, used for errors that only the user can fix.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_minutes * 60)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 120);
        assert_eq!(secs(&mut backoff), 180);
        assert_eq!(secs(&mut backoff), 300);
        assert_eq!(secs(&mut backoff), 480);
        assert_eq!(secs(&mut backoff), 600);
        // 13m would be next; capped
        assert_eq!(secs(&mut backoff), 600);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 120);

        backoff.reset();

        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
    }

    #[test]
    fn test_max_backoff_ignores_position() {
        let backoff = FibonacciBackoff::new(1, 10);
        assert_eq!(backoff.max_backoff(), Duration::from_secs(600));
    }
}
