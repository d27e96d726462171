//! SQLite store for the Chime reminder engine.
//!
//! One database file holds the events, the device token registry and the
//! delivery ledger. [`StoreAdapterSqlite`] implements all three adapter
//! traits, so it can be handed to the app builder as a single store.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

mod event;
mod ledger;
mod schema;
mod token;
mod utils;

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::{path::Path, time::Duration};

use chime_types::event_adapter::EventAdapter;
use chime_types::ledger_adapter::LedgerAdapter;
use chime_types::prelude::*;
use chime_types::token_adapter::TokenAdapter;
use chime_types::types::{
	CommitResult, DeliveryRecord, DeviceToken, Event, EventReminder, FireWindow, ReminderTask,
	TaskOutcome,
};

#[derive(Debug)]
pub struct StoreAdapterSqlite {
	db: SqlitePool,
}

impl StoreAdapterSqlite {
	/// Opens (or creates) the database file at `path` and runs migrations.
	/// If `path` is a directory, the database is created as `chime.db` inside.
	pub async fn new(path: impl AsRef<Path>) -> ChResult<Self> {
		let path = path.as_ref();
		let db_path = if tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_dir()) {
			path.join("chime.db")
		} else {
			path.to_path_buf()
		};

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(&db_path)
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(10));
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		schema::init_db(&db)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		info!("Store opened at {}", db_path.display());
		Ok(Self { db })
	}

	/// Creates or replaces an event with its reminders and invitees
	pub async fn upsert_event(&self, event: &Event) -> ChResult<()> {
		event::upsert(&self.db, event).await
	}

	pub async fn delete_event(&self, event_id: &EventId) -> ChResult<()> {
		event::delete(&self.db, event_id).await
	}

	/// Registers a device token, reviving it if it was invalidated
	pub async fn register_token(&self, token: &DeviceToken) -> ChResult<()> {
		token::register(&self.db, token).await
	}
}

#[async_trait]
impl EventAdapter for StoreAdapterSqlite {
	async fn query_by_fire_window(&self, window: FireWindow) -> ChResult<Vec<EventReminder>> {
		event::query_by_fire_window(&self.db, window).await
	}

	async fn read_event(&self, event_id: &EventId) -> ChResult<Event> {
		event::read(&self.db, event_id).await
	}
}

#[async_trait]
impl TokenAdapter for StoreAdapterSqlite {
	async fn tokens_for(&self, user_id: &UserId) -> ChResult<Vec<DeviceToken>> {
		token::list(&self.db, user_id).await
	}

	async fn invalidate(&self, token: &DeviceToken) -> ChResult<()> {
		token::invalidate(&self.db, token).await
	}
}

#[async_trait]
impl LedgerAdapter for StoreAdapterSqlite {
	async fn claim(
		&self,
		task: &ReminderTask,
		holder: &HolderId,
		lease: Duration,
		now: Timestamp,
	) -> ChResult<bool> {
		ledger::claim(&self.db, task, holder, lease, now).await
	}

	async fn commit(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		outcome: TaskOutcome,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<CommitResult> {
		ledger::commit(&self.db, task_id, holder, outcome, last_error, now).await
	}

	async fn release(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		retry_at: Timestamp,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<bool> {
		ledger::release(&self.db, task_id, holder, retry_at, last_error, now).await
	}

	async fn read(&self, task_ids: &[TaskId]) -> ChResult<Vec<DeliveryRecord>> {
		ledger::read(&self.db, task_ids).await
	}
}

// vim: ts=4
