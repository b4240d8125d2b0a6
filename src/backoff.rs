//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff mechanism for retries.
//! The sequence grows more slowly than exponential backoff, which suits
//! both conflict retries of align-then-update writes (milliseconds) and
//! requeues of failed reconciliations (minutes).
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use walrus::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(Duration::from_millis(10), Duration::from_millis(50));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(20));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(30));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(50));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff value (for reset)
    min: Duration,
    /// Previous backoff value
    prev: Duration,
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with specified minimum and maximum values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum backoff duration (used for the first two values)
    /// * `max` - Maximum backoff duration (caps the sequence)
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Backoff of failed reconciliations: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
    #[must_use]
    pub fn for_reconciliation() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::for_reconciliation();

        // 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
        let secs: Vec<u64> = (0..7).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(secs, vec![60, 60, 120, 180, 300, 480, 600]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(Duration::from_millis(10), Duration::from_millis(25));

        assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(10));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(20));
        // Next would be 30ms, capped at 25ms
        assert_eq!(backoff.next_backoff(), Duration::from_millis(25));
        assert_eq!(backoff.next_backoff(), Duration::from_millis(25));
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::for_reconciliation();

        backoff.next_backoff();
        backoff.next_backoff();
        backoff.next_backoff();

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }
}
