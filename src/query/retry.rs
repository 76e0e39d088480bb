//! Retry policy for failed executions.

use std::time::Duration;

/// Governs re-attempts of a failed execution.
///
/// `max_attempts` is the total number of transport calls: a persistently
/// failing request under `RetryPolicy::new(3)` hits the transport exactly
/// three times and then settles as an error. The delay runs between
/// attempts, inside the deduplicated execution, so callers that joined the
/// original attempt observe the final outcome after all retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempt budget, including the first attempt
  pub max_attempts: u32,
  /// Pause between consecutive attempts
  pub retry_delay: Duration,
}

impl RetryPolicy {
  /// Create a policy with the given attempt budget and a 1s delay.
  pub fn new(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      retry_delay: Duration::from_secs(1),
    }
  }

  /// Set the delay between attempts.
  pub fn with_delay(mut self, retry_delay: Duration) -> Self {
    self.retry_delay = retry_delay;
    self
  }

  /// Whether another attempt is allowed after `attempts_made` failures.
  pub fn should_retry(&self, attempts_made: u32) -> bool {
    attempts_made < self.max_attempts
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(3)
  }
}
