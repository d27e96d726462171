//! Exponential backoff policy

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Minimum and maximum wait between attempts, in milliseconds
	wait_min_max: (u64, u64),
	/// Maximum number of attempts, including the first one
	times: u16,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { wait_min_max: (500, 8000), times: 3 }
	}
}

impl RetryPolicy {
	/// Create a new RetryPolicy with custom min/max backoff (ms) and number of attempts
	pub fn new(wait_min_max: (u64, u64), times: u16) -> Self {
		Self { wait_min_max, times }
	}

	/// Exponential backoff after the given (1-based) failed attempt:
	/// min * 2^(attempt-1), capped at max
	pub fn calculate_backoff(&self, attempt: u16) -> Duration {
		let (min, max) = self.wait_min_max;
		let shift = u32::from(attempt.saturating_sub(1)).min(32);
		let backoff = min.saturating_mul(1u64 << shift);
		Duration::from_millis(backoff.min(max))
	}

	/// Check if another attempt is allowed after `attempt` attempts were made
	pub fn should_retry(&self, attempt: u16) -> bool {
		attempt < self.times
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backoff_doubles_and_caps() {
		let policy = RetryPolicy::new((100, 1000), 10);
		assert_eq!(policy.calculate_backoff(1), Duration::from_millis(100));
		assert_eq!(policy.calculate_backoff(2), Duration::from_millis(200));
		assert_eq!(policy.calculate_backoff(4), Duration::from_millis(800));
		assert_eq!(policy.calculate_backoff(5), Duration::from_millis(1000));
		assert_eq!(policy.calculate_backoff(60), Duration::from_millis(1000));
	}

	#[test]
	fn test_should_retry() {
		let policy = RetryPolicy::new((1, 1), 3);
		assert!(policy.should_retry(1));
		assert!(policy.should_retry(2));
		assert!(!policy.should_retry(3));
	}
}

// vim: ts=4
