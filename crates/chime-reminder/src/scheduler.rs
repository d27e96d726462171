//! Due reminder computation
//!
//! A reminder is due for an invocation at `T` when its fire time is in
//! `(T - lookahead, T]`. The scheduler only proposes candidates; whether a
//! task is delivered is decided by the ledger claim.

use itertools::Itertools;
use std::{collections::HashMap, sync::Arc};

use crate::prelude::*;
use chime_types::types::{DeliveryRecord, Event, EventReminder, FireWindow, ReminderTask};

#[derive(Debug)]
pub struct ReminderScheduler<'a> {
	app: &'a App,
}

impl<'a> ReminderScheduler<'a> {
	pub fn new(app: &'a App) -> Self {
		Self { app }
	}

	pub fn window(&self, now: Timestamp) -> FireWindow {
		FireWindow::due_at(now, self.app.config.lookahead)
	}

	/// Tasks due at `now` that are neither finished nor held by a live claim.
	///
	/// Fails if the event store cannot be queried; no partial result is
	/// returned in that case.
	pub async fn candidates(&self, now: Timestamp) -> ChResult<Vec<ReminderTask>> {
		let window = self.window(now);
		let reminders = self.app.event_adapter.query_by_fire_window(window).await?;
		let tasks = reminders
			.into_iter()
			.map(|EventReminder { event, offset_secs }| ReminderTask::new(event, offset_secs));
		self.open_tasks(tasks, now).await
	}

	/// Same as [`candidates`](Self::candidates), restricted to one event
	pub async fn candidates_for_event(
		&self,
		event: Arc<Event>,
		now: Timestamp,
	) -> ChResult<Vec<ReminderTask>> {
		let window = self.window(now);
		let tasks = event
			.reminders
			.iter()
			.filter(|&&offset| window.contains(event.fire_at(offset)))
			.map(|&offset| ReminderTask::new(event.clone(), offset))
			.collect::<Vec<_>>();
		self.open_tasks(tasks, now).await
	}

	async fn open_tasks(
		&self,
		tasks: impl IntoIterator<Item = ReminderTask>,
		now: Timestamp,
	) -> ChResult<Vec<ReminderTask>> {
		let tasks: Vec<ReminderTask> = tasks
			.into_iter()
			.unique_by(|task| task.task_id.clone())
			.sorted_by_key(|task| task.fire_at)
			.collect();
		if tasks.is_empty() {
			return Ok(tasks);
		}

		let ids: Vec<TaskId> = tasks.iter().map(|task| task.task_id.clone()).collect();
		let records: HashMap<TaskId, DeliveryRecord> = self
			.app
			.ledger_adapter
			.read(&ids)
			.await?
			.into_iter()
			.map(|record| (record.task_id.clone(), record))
			.collect();

		let total = tasks.len();
		let open: Vec<ReminderTask> = tasks
			.into_iter()
			.filter(|task| records.get(&task.task_id).is_none_or(|record| record.is_claimable(now)))
			.collect();
		debug!(due = total, open = open.len(), "Computed reminder candidates");
		Ok(open)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::{Fixture, event};
	use chime_types::ledger_adapter::LedgerAdapter;
	use chime_types::types::TaskOutcome;
	use std::time::Duration;

	const S: i64 = 100_000;

	#[tokio::test]
	async fn test_window_example() {
		let f = Fixture::new();
		f.events.upsert(event("ev1", S, &[1800], &[]));
		let scheduler = ReminderScheduler::new(&f.app);

		assert!(scheduler.candidates(Timestamp(S - 31 * 60)).await.unwrap().is_empty());
		let due = scheduler.candidates(Timestamp(S - 29 * 60)).await.unwrap();
		assert_eq!(due.len(), 1);
		assert_eq!(due[0].fire_at, Timestamp(S - 1800));
		assert_eq!(due[0].task_id, TaskId::for_reminder(&"ev1".into(), 1800));
		// Fire time exactly at the window start is no longer due
		assert!(scheduler.candidates(Timestamp(S - 1800 + 300)).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_duplicate_offsets_yield_one_task() {
		let f = Fixture::new();
		f.events.upsert(event("ev1", S, &[400, 400, 300], &[]));
		let due = ReminderScheduler::new(&f.app).candidates(Timestamp(S - 250)).await.unwrap();
		assert_eq!(due.len(), 2);
		assert_eq!(due[0].offset_secs, 400);
		assert_eq!(due[1].offset_secs, 300);
	}

	#[tokio::test]
	async fn test_finished_and_held_tasks_are_dropped() {
		let f = Fixture::new();
		let ev = Arc::new(event("ev1", S, &[200, 100, 60], &[]));
		f.events.upsert(Event::clone(&ev));
		let now = Timestamp(S - 30);
		let lease = Duration::from_secs(120);

		let sent = ReminderTask::new(ev.clone(), 200);
		f.ledger.claim(&sent, &"h1".into(), lease, now).await.unwrap();
		f.ledger.commit(&sent.task_id, &"h1".into(), TaskOutcome::Sent, None, now).await.unwrap();
		let held = ReminderTask::new(ev.clone(), 100);
		f.ledger.claim(&held, &"h2".into(), lease, now).await.unwrap();

		let scheduler = ReminderScheduler::new(&f.app);
		let due = scheduler.candidates(now).await.unwrap();
		assert_eq!(due.len(), 1);
		assert_eq!(due[0].offset_secs, 60);

		// Expired lease makes the held task a candidate again
		let later = now.add_duration(lease);
		let due = scheduler.candidates_for_event(ev, later).await.unwrap();
		assert_eq!(due.iter().map(|t| t.offset_secs).collect::<Vec<_>>(), vec![100, 60]);
	}

	#[tokio::test]
	async fn test_store_outage_fails() {
		let f = Fixture::new();
		f.events.set_unavailable(true);
		let res = ReminderScheduler::new(&f.app).candidates(Timestamp(S)).await;
		assert!(matches!(res, Err(Error::ServiceUnavailable(_))));
	}
}

// vim: ts=4
