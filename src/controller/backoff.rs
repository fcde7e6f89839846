//! # Fibonacci Backoff
//!
//! Progressive retry delay for failed ComputeDomain reconciliations. Grows
//! more slowly than exponential backoff so transient API errors recover
//! quickly while persistent ones settle at the cap.
//!
//! ```rust
//! use compute_domain_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(5, 300);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 5);
//! assert_eq!(backoff.next_backoff_seconds(), 10);
//! assert_eq!(backoff.next_backoff_seconds(), 15);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Fibonacci backoff calculator, in seconds
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// First value of the sequence, restored on reset
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// `min_secs` seeds the sequence, `max_secs` caps it
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs.min(max_secs),
            max_secs,
        }
    }

    /// Current delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Restart from the minimum after a successful reconciliation
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs.min(self.max_secs);
    }
}

/// One [`FibonacciBackoff`] per resource key, created on first failure
#[derive(Debug)]
pub struct BackoffStates {
    min_secs: u64,
    max_secs: u64,
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffStates {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next retry of `key`
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min_secs, self.max_secs))
            .next_backoff()
    }

    /// Restart the sequence for `key` after a success
    pub fn reset(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backoff) = states.get_mut(key) {
            backoff.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(5, 300);
        let seq: Vec<u64> = (0..8).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(seq, vec![5, 5, 10, 15, 25, 40, 65, 105]);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(5, 30);
        let seq: Vec<u64> = (0..7).map(|_| backoff.next_backoff_seconds()).collect();
        // 25 + 15 would be 40; capped at 30 and stays there
        assert_eq!(seq, vec![5, 5, 10, 15, 25, 30, 30]);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(5, 300);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();

        backoff.reset();

        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_min_above_max_is_clamped() {
        let mut backoff = FibonacciBackoff::new(60, 10);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 10);
    }

    #[test]
    fn test_backoff_states_track_keys_independently() {
        let states = BackoffStates::new(5, 300);
        assert_eq!(states.next_backoff("ns/a"), Duration::from_secs(5));
        assert_eq!(states.next_backoff("ns/a"), Duration::from_secs(5));
        assert_eq!(states.next_backoff("ns/a"), Duration::from_secs(10));
        assert_eq!(states.next_backoff("ns/b"), Duration::from_secs(5));

        states.reset("ns/a");
        assert_eq!(states.next_backoff("ns/a"), Duration::from_secs(5));
        assert_eq!(states.next_backoff("ns/b"), Duration::from_secs(5));
        assert_eq!(states.next_backoff("ns/b"), Duration::from_secs(10));

        // Nothing to reset for a key that never failed
        states.reset("ns/c");
        assert_eq!(states.next_backoff("ns/c"), Duration::from_secs(5));
    }
}
