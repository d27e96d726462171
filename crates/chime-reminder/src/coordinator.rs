//! Trigger coordination
//!
//! One coordinator serves one invocation. It identifies itself to the ledger
//! with a fresh holder token and runs every candidate task through
//! claim, dispatch, then commit or release. Tasks are independent: a failing
//! task never aborts its siblings, and a task that loses its claim is simply
//! skipped. A task is only released while a later tick can still see it;
//! otherwise its failure is committed. Nothing is kept between invocations; a killed invocation leaves
//! only committed ledger writes behind and its leases expire on their own.

use futures::StreamExt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::prelude::*;
use crate::scheduler::ReminderScheduler;
use chime_core::registry::InvocationReport;
use chime_push::dispatch::{NotificationDispatcher, TRANSIENT};
use chime_types::types::{CommitResult, ReminderTask, TaskOutcome};

/// What happened to one candidate task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskResult {
	Sent,
	Failed,
	Retrying,
	Skipped,
	Error,
}

#[derive(Debug)]
pub struct TriggerCoordinator<'a> {
	app: &'a App,
	holder: HolderId,
	deadline: Instant,
}

impl<'a> TriggerCoordinator<'a> {
	pub fn new(app: &'a App) -> Self {
		Self::with_holder(app, HolderId::from(uuid::Uuid::new_v4().to_string()))
	}

	pub fn with_holder(app: &'a App, holder: HolderId) -> Self {
		Self { app, holder, deadline: Instant::now() + app.config.invocation_budget }
	}

	pub fn holder(&self) -> &HolderId {
		&self.holder
	}

	/// Periodic trigger: processes every reminder due at `now`.
	///
	/// Fails before any claim is taken if the candidates cannot be computed.
	pub async fn run_tick(&self, now: Timestamp) -> ChResult<InvocationReport> {
		let tasks = ReminderScheduler::new(self.app).candidates(now).await.inspect_err(|e| {
			error!(holder = %self.holder, error = %e, "Failed to compute reminder candidates");
		})?;
		Ok(self.process(tasks).await)
	}

	/// Event-write trigger: processes the reminders of one event that are due
	/// at `now`. A deleted event has nothing to send.
	pub async fn on_event_changed(
		&self,
		event_id: &EventId,
		now: Timestamp,
	) -> ChResult<InvocationReport> {
		let event = match self.app.event_adapter.read_event(event_id).await {
			Ok(event) => event,
			Err(Error::NotFound) => {
				debug!(%event_id, "Changed event no longer exists");
				return Ok(InvocationReport { holder: Some(self.holder.clone()), ..Default::default() });
			}
			Err(e) => return Err(e),
		};
		let tasks = ReminderScheduler::new(self.app).candidates_for_event(Arc::new(event), now).await?;
		Ok(self.process(tasks).await)
	}

	async fn process(&self, tasks: Vec<ReminderTask>) -> InvocationReport {
		let mut report = InvocationReport {
			candidates: tasks.len(),
			holder: Some(self.holder.clone()),
			..Default::default()
		};
		if tasks.is_empty() {
			return report;
		}

		let results: Vec<TaskResult> = futures::stream::iter(tasks)
			.map(|task| {
				let span = info_span!("task", task_id = %task.task_id, event_id = %task.event.event_id);
				async move { self.run_task(&task).await }.instrument(span)
			})
			.buffer_unordered(self.app.config.max_concurrency)
			.collect()
			.await;

		for res in results {
			match res {
				TaskResult::Sent => report.sent += 1,
				TaskResult::Failed => report.failed += 1,
				TaskResult::Retrying => report.retrying += 1,
				TaskResult::Skipped => report.skipped += 1,
				TaskResult::Error => report.errors += 1,
			}
		}
		info!(
			holder = %self.holder,
			candidates = report.candidates,
			sent = report.sent,
			failed = report.failed,
			retrying = report.retrying,
			skipped = report.skipped,
			errors = report.errors,
			"Invocation finished"
		);
		report
	}

	async fn run_task(&self, task: &ReminderTask) -> TaskResult {
		if Instant::now() >= self.deadline {
			debug!("Invocation budget exhausted, leaving task for a later invocation");
			return TaskResult::Skipped;
		}

		let ledger = &self.app.ledger_adapter;
		match ledger.claim(task, &self.holder, self.app.config.lease, self.app.now()).await {
			Ok(true) => {}
			Ok(false) => {
				debug!("Claim denied");
				return TaskResult::Skipped;
			}
			Err(e) => {
				warn!(error = %e, "Claim failed");
				return TaskResult::Error;
			}
		}

		let dispatched = NotificationDispatcher::new(self.app, self.deadline).dispatch(task).await;
		match dispatched {
			Ok(report) => match report.outcome() {
				TaskOutcome::Sent => self.commit(task, TaskOutcome::Sent, report.error_class).await,
				TaskOutcome::Failed => {
					self.fail_or_retry(task, report.error_class.unwrap_or(TRANSIENT)).await
				}
			},
			Err(e) => {
				warn!(error = %e, "Dispatch failed");
				match self.fail_or_retry(task, e.class()).await {
					TaskResult::Retrying => TaskResult::Error,
					other => other,
				}
			}
		}
	}

	async fn commit(
		&self,
		task: &ReminderTask,
		outcome: TaskOutcome,
		error_class: Option<&str>,
	) -> TaskResult {
		let res = self
			.app
			.ledger_adapter
			.commit(&task.task_id, &self.holder, outcome, error_class, self.app.now())
			.await;
		match (res, outcome) {
			(Ok(CommitResult::Committed), TaskOutcome::Sent) => {
				info!("Reminder sent");
				TaskResult::Sent
			}
			(Ok(CommitResult::Committed), TaskOutcome::Failed) => {
				warn!(error_class = ?error_class, "Reminder failed permanently");
				TaskResult::Failed
			}
			(Ok(CommitResult::Stale), _) => {
				info!("Claim was lost before commit, discarding result");
				TaskResult::Skipped
			}
			(Err(e), _) => {
				error!(error = %e, "Commit failed");
				TaskResult::Error
			}
		}
	}

	/// Whether a periodic tick after this one still finds the task due
	fn due_on_next_tick(&self, task: &ReminderTask, now: Timestamp) -> bool {
		let config = &self.app.config;
		task.fire_at.add_duration(config.lookahead) > now.add_duration(config.trigger_interval)
	}

	/// Releases the task for a later invocation, or fails it once it has used
	/// up its attempts or is about to leave the window
	async fn fail_or_retry(&self, task: &ReminderTask, error_class: &str) -> TaskResult {
		let attempts = match self.app.ledger_adapter.read(std::slice::from_ref(&task.task_id)).await
		{
			Ok(records) => records.first().map_or(1, |record| record.attempts),
			Err(e) => {
				warn!(error = %e, "Failed to read attempt count");
				1
			}
		};
		if attempts >= self.app.config.max_task_attempts {
			return self.commit(task, TaskOutcome::Failed, Some(error_class)).await;
		}
		if !self.due_on_next_tick(task, self.app.now()) {
			info!(attempts, "Task leaves the window before its next attempt");
			return self.commit(task, TaskOutcome::Failed, Some(error_class)).await;
		}
		self.release(task, attempts, error_class).await
	}

	async fn release(&self, task: &ReminderTask, attempts: u32, error_class: &str) -> TaskResult {
		let policy = self.app.config.task_retry_policy();
		let backoff = policy.calculate_backoff(u16::try_from(attempts).unwrap_or(u16::MAX));
		let now = self.app.now();
		let retry_at = now.add_duration(backoff);

		match self
			.app
			.ledger_adapter
			.release(&task.task_id, &self.holder, retry_at, Some(error_class), now)
			.await
		{
			Ok(true) => {
				info!(attempts, %retry_at, "Released task for retry");
				TaskResult::Retrying
			}
			Ok(false) => {
				info!("Claim was lost before release");
				TaskResult::Skipped
			}
			Err(e) => {
				error!(error = %e, "Release failed");
				TaskResult::Error
			}
		}
	}
}


// vim: ts=4
