//! Notification dispatch
//!
//! Resolves the audience of a reminder to device tokens, sends one batch per
//! platform, and classifies the per-token outcomes:
//!
//! - `Success`: done
//! - `Invalid`: the token is invalidated in the registry and never retried
//! - `Rejected`: not retried, the token is kept
//! - `Transient`: re-sent with exponential backoff, only the still-transient
//!   tokens, until the attempt limit or the invocation deadline
//!
//! A task counts as sent unless every token ended with exhausted transient
//! retries. Reasons reported by the gateways are logged; the report only
//! carries a stable error class for the ledger.

use itertools::Itertools;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::payload::reminder_payload;
use crate::prelude::*;
use chime_core::retry::RetryPolicy;
use chime_types::push_gateway::{NotificationPayload, PushGateway, PushOutcome};
use chime_types::types::{DeviceToken, Platform, ReminderTask, TaskOutcome};

pub const TRANSIENT: &str = "transient";
pub const REJECTED: &str = "rejected";
pub const NO_GATEWAY: &str = "no_gateway";

/// Per-token results of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
	/// Distinct tokens the payload was addressed to
	pub tokens: usize,
	pub delivered: usize,
	/// Tokens pruned after a permanent invalid-token response
	pub invalidated: usize,
	pub rejected: usize,
	/// Tokens still failing transiently when retries ran out
	pub exhausted: Vec<DeviceToken>,
	/// Class of the last transient or rejected outcome, e.g. `transient`
	pub error_class: Option<&'static str>,
}

impl DispatchReport {
	pub fn outcome(&self) -> TaskOutcome {
		if self.tokens > 0 && self.exhausted.len() == self.tokens {
			TaskOutcome::Failed
		} else {
			TaskOutcome::Sent
		}
	}

	fn merge(&mut self, other: DispatchReport) {
		self.tokens += other.tokens;
		self.delivered += other.delivered;
		self.invalidated += other.invalidated;
		self.rejected += other.rejected;
		self.exhausted.extend(other.exhausted);
		if other.error_class.is_some() {
			self.error_class = other.error_class;
		}
	}
}

#[derive(Debug)]
pub struct NotificationDispatcher<'a> {
	app: &'a App,
	retry: RetryPolicy,
	gateway_timeout: Duration,
	deadline: Instant,
}

impl<'a> NotificationDispatcher<'a> {
	/// Creates a dispatcher whose retries never extend past `deadline`
	pub fn new(app: &'a App, deadline: Instant) -> Self {
		Self {
			app,
			retry: app.config.send_retry_policy(),
			gateway_timeout: app.config.gateway_timeout,
			deadline,
		}
	}

	/// Sends the reminder of a claimed task to its event's audience
	pub async fn dispatch(&self, task: &ReminderTask) -> ChResult<DispatchReport> {
		let payload = reminder_payload(task);
		debug!(task_id = %task.task_id, event_id = %task.event.event_id, "Dispatching reminder");
		self.send_to_users(&task.event.audience(), &payload).await
	}

	/// Sends a payload to every valid device of the given users.
	///
	/// Fails only if the token registry cannot be read; gateway problems are
	/// reported per token.
	pub async fn send_to_users(
		&self,
		users: &[UserId],
		payload: &NotificationPayload,
	) -> ChResult<DispatchReport> {
		let mut tokens = Vec::new();
		for user_id in users {
			tokens.extend(self.app.token_adapter.tokens_for(user_id).await?);
		}

		// The same device registered for two audience members gets it once
		let mut batches: BTreeMap<Platform, Vec<DeviceToken>> = BTreeMap::new();
		for token in tokens.into_iter().unique_by(|t| (t.platform, t.token.clone())) {
			batches.entry(token.platform).or_default().push(token);
		}

		let reports = futures::future::join_all(
			batches.into_iter().map(|(platform, batch)| self.send_batch(platform, batch, payload)),
		)
		.await;

		let mut report = DispatchReport::default();
		for partial in reports {
			report.merge(partial);
		}
		Ok(report)
	}

	async fn send_batch(
		&self,
		platform: Platform,
		batch: Vec<DeviceToken>,
		payload: &NotificationPayload,
	) -> DispatchReport {
		let mut report = DispatchReport { tokens: batch.len(), ..Default::default() };
		let Some(gateway) = self.app.push.gateway(platform) else {
			warn!(%platform, tokens = batch.len(), "No push gateway configured for platform");
			report.rejected = batch.len();
			report.error_class = Some(NO_GATEWAY);
			return report;
		};

		let mut pending = batch;
		let mut attempt: u16 = 0;
		loop {
			attempt += 1;
			let outcomes = self.send_once(gateway, &pending, payload).await;

			let mut retry = Vec::new();
			for (token, outcome) in pending.into_iter().zip(outcomes) {
				match outcome {
					PushOutcome::Success => report.delivered += 1,
					PushOutcome::Invalid => {
						info!(user_id = %token.user_id, %platform, "Invalidating rejected device token");
						if let Err(e) = self.app.token_adapter.invalidate(&token).await {
							warn!(user_id = %token.user_id, error = %e, "Failed to invalidate device token");
						}
						report.invalidated += 1;
					}
					PushOutcome::Rejected(reason) => {
						warn!(user_id = %token.user_id, %platform, reason = %reason, "Push rejected");
						report.rejected += 1;
						report.error_class = Some(REJECTED);
					}
					PushOutcome::Transient(reason) => {
						debug!(user_id = %token.user_id, %platform, attempt, reason = %reason, "Transient push error");
						report.error_class = Some(TRANSIENT);
						retry.push(token);
					}
				}
			}

			if retry.is_empty() {
				return report;
			}
			if !self.retry.should_retry(attempt) {
				warn!(%platform, tokens = retry.len(), attempt, "Push retries exhausted");
				report.exhausted = retry;
				return report;
			}
			let backoff = self.retry.calculate_backoff(attempt);
			if Instant::now() + backoff >= self.deadline {
				info!(%platform, tokens = retry.len(), "Invocation deadline reached, not retrying push");
				report.exhausted = retry;
				return report;
			}
			tokio::time::sleep(backoff).await;
			pending = retry;
		}
	}

	/// One gateway call. Errors and timeouts become a transient outcome for
	/// every token of the batch.
	async fn send_once(
		&self,
		gateway: &Arc<dyn PushGateway>,
		tokens: &[DeviceToken],
		payload: &NotificationPayload,
	) -> Vec<PushOutcome> {
		let remaining = self.deadline.saturating_duration_since(Instant::now());
		let timeout = self.gateway_timeout.min(remaining);

		let reason = match tokio::time::timeout(timeout, gateway.send(tokens, payload)).await {
			Ok(Ok(outcomes)) if outcomes.len() == tokens.len() => return outcomes,
			Ok(Ok(outcomes)) => {
				format!("gateway returned {} outcomes for {} tokens", outcomes.len(), tokens.len())
			}
			Ok(Err(e)) => format!("gateway error: {}", e),
			Err(_) => format!("gateway timeout after {}ms", timeout.as_millis()),
		};
		warn!(platform = %gateway.platform(), tokens = tokens.len(), reason = %reason, "Push batch failed");
		vec![PushOutcome::Transient(reason); tokens.len()]
	}
}


// vim: ts=4
