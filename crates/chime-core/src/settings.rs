//! Engine configuration
//!
//! All options have defaults; each can be overridden from the environment
//! (`CHIME_*` variables) or through the app builder. `validate` rejects
//! combinations that could skip reminders or never finish an invocation.

use std::time::Duration;

use crate::prelude::*;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
	/// Reminders with a fire time in `(now - lookahead, now]` are due
	pub lookahead: Duration,
	/// Interval of the periodic trigger; must not exceed `lookahead`
	pub trigger_interval: Duration,
	/// Claim lease taken for each task; must outlast `invocation_budget`
	pub lease: Duration,
	/// Maximum number of tasks dispatched concurrently in one invocation
	pub max_concurrency: usize,
	/// Maximum send attempts per token for transient gateway errors
	pub max_send_attempts: u16,
	/// Maximum claims of one task across invocations before it is failed.
	///
	/// A released task is only retried while it is still inside the window,
	/// so a value above `reachable_task_attempts()` is never reached: the
	/// task is failed on its last visible tick instead.
	pub max_task_attempts: u32,
	/// Timeout of a single gateway call
	pub gateway_timeout: Duration,
	/// Execution budget of one invocation
	pub invocation_budget: Duration,
	pub backoff_min: Duration,
	pub backoff_max: Duration,
}

impl Default for ReminderConfig {
	fn default() -> Self {
		Self {
			lookahead: Duration::from_secs(300),
			trigger_interval: Duration::from_secs(60),
			lease: Duration::from_secs(120),
			max_concurrency: 8,
			max_send_attempts: 3,
			max_task_attempts: 5,
			gateway_timeout: Duration::from_millis(10_000),
			invocation_budget: Duration::from_secs(50),
			backoff_min: Duration::from_millis(500),
			backoff_max: Duration::from_millis(8000),
		}
	}
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> ChResult<T> {
	value
		.trim()
		.parse()
		.map_err(|_| Error::ConfigError(format!("invalid value for {}: {:?}", key, value)))
}

impl ReminderConfig {
	/// Loads the configuration from process environment variables
	pub fn from_env() -> ChResult<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Loads the configuration from an arbitrary key lookup, starting from
	/// the defaults. The result is validated.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChResult<Self> {
		let mut config = Self::default();

		let secs = |key: &str, target: &mut Duration| -> ChResult<()> {
			if let Some(value) = lookup(key) {
				*target = Duration::from_secs(parse_var(key, &value)?);
			}
			Ok(())
		};
		secs("CHIME_LOOKAHEAD_SECS", &mut config.lookahead)?;
		secs("CHIME_TRIGGER_INTERVAL_SECS", &mut config.trigger_interval)?;
		secs("CHIME_LEASE_SECS", &mut config.lease)?;
		secs("CHIME_INVOCATION_BUDGET_SECS", &mut config.invocation_budget)?;

		let millis = |key: &str, target: &mut Duration| -> ChResult<()> {
			if let Some(value) = lookup(key) {
				*target = Duration::from_millis(parse_var(key, &value)?);
			}
			Ok(())
		};
		millis("CHIME_GATEWAY_TIMEOUT_MS", &mut config.gateway_timeout)?;
		millis("CHIME_BACKOFF_MIN_MS", &mut config.backoff_min)?;
		millis("CHIME_BACKOFF_MAX_MS", &mut config.backoff_max)?;

		if let Some(value) = lookup("CHIME_MAX_CONCURRENCY") {
			config.max_concurrency = parse_var("CHIME_MAX_CONCURRENCY", &value)?;
		}
		if let Some(value) = lookup("CHIME_MAX_SEND_ATTEMPTS") {
			config.max_send_attempts = parse_var("CHIME_MAX_SEND_ATTEMPTS", &value)?;
		}
		if let Some(value) = lookup("CHIME_MAX_TASK_ATTEMPTS") {
			config.max_task_attempts = parse_var("CHIME_MAX_TASK_ATTEMPTS", &value)?;
		}

		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> ChResult<()> {
		let positive = [
			("lookahead", self.lookahead),
			("trigger_interval", self.trigger_interval),
			("lease", self.lease),
			("gateway_timeout", self.gateway_timeout),
			("invocation_budget", self.invocation_budget),
		];
		for (name, value) in positive {
			if value.is_zero() {
				return Err(Error::ConfigError(format!("{} must be positive", name)));
			}
		}
		// Timestamps have second resolution
		for (name, value) in [("lookahead", self.lookahead), ("lease", self.lease)] {
			if value.as_secs() == 0 {
				return Err(Error::ConfigError(format!("{} must be at least one second", name)));
			}
		}
		if self.max_concurrency == 0 {
			return Err(Error::ConfigError("max_concurrency must be at least 1".into()));
		}
		if self.max_send_attempts == 0 || self.max_task_attempts == 0 {
			return Err(Error::ConfigError("attempt limits must be at least 1".into()));
		}
		if self.trigger_interval > self.lookahead {
			return Err(Error::ConfigError(format!(
				"trigger_interval ({}s) exceeds lookahead ({}s); reminders would be skipped",
				self.trigger_interval.as_secs(),
				self.lookahead.as_secs()
			)));
		}
		if self.backoff_min > self.backoff_max {
			return Err(Error::ConfigError("backoff_min exceeds backoff_max".into()));
		}
		if self.lease <= self.invocation_budget {
			return Err(Error::ConfigError(format!(
				"lease ({}s) must be longer than invocation_budget ({}s)",
				self.lease.as_secs(),
				self.invocation_budget.as_secs()
			)));
		}
		if self.gateway_timeout >= self.invocation_budget {
			return Err(Error::ConfigError(
				"gateway_timeout must be shorter than invocation_budget".into(),
			));
		}
		Ok(())
	}

	/// Number of periodic ticks guaranteed to see a reminder while it is due
	pub fn reachable_task_attempts(&self) -> u32 {
		let interval = self.trigger_interval.as_secs().max(1);
		u32::try_from(self.lookahead.as_secs() / interval).unwrap_or(u32::MAX).max(1)
	}

	/// Backoff used between transient send attempts within an invocation
	pub fn send_retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(
			(self.backoff_min.as_millis() as u64, self.backoff_max.as_millis() as u64),
			self.max_send_attempts,
		)
	}

	/// Backoff before a released task may be claimed again
	pub fn task_retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(
			(self.backoff_min.as_millis() as u64, self.backoff_max.as_millis() as u64),
			u16::try_from(self.max_task_attempts).unwrap_or(u16::MAX),
		)
	}
}


// vim: ts=4
