//! # Fibonacci Backoff
//!
//! Progressive delay between resubscribe attempts. Grows more slowly than
//! exponential backoff, so a briefly unavailable netlink socket is retried
//! quickly while a persistent failure settles at the cap.
//!
//! Sequence with a 1s minimum and 30s cap: 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, starting from the minimum and
/// capped at the maximum.
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
    /// Create a new Fibonacci backoff with the given minimum and maximum
    ///
    /// # Arguments
    ///
    /// * `min` - First delay, also used for the second value
    /// * `max` - Cap on the sequence
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.min(max);
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}
