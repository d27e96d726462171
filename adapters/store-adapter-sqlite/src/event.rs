//! Event storage and fire-window queries

use std::{collections::HashMap, sync::Arc};

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::utils::{collect_res, inspect, map_res};
use chime_types::prelude::*;
use chime_types::types::{Event, EventReminder, FireWindow};

/// Load one event with its reminders and invitees
async fn load(conn: &mut SqliteConnection, event_id: &str) -> ChResult<Event> {
	let res = sqlx::query(
		"SELECT event_id, owner_id, title, start_at, timezone FROM events WHERE event_id = ?1",
	)
	.bind(event_id)
	.fetch_one(&mut *conn)
	.await;
	let mut event = map_res(res, |row| {
		Ok(Event {
			event_id: row.try_get::<String, _>("event_id")?.into(),
			owner_id: row.try_get::<String, _>("owner_id")?.into(),
			title: row.try_get::<String, _>("title")?.into(),
			start_at: Timestamp(row.try_get("start_at")?),
			timezone: row.try_get::<String, _>("timezone")?.into(),
			reminders: Vec::new(),
			invitees: Vec::new(),
		})
	})?;

	let rows =
		sqlx::query("SELECT offset_secs FROM event_reminders WHERE event_id = ?1 ORDER BY ord")
			.bind(event_id)
			.fetch_all(&mut *conn)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
	event.reminders = collect_res(rows.iter().map(|row| row.try_get::<i64, _>("offset_secs")))?;

	let rows = sqlx::query("SELECT user_id FROM event_invitees WHERE event_id = ?1 ORDER BY ord")
		.bind(event_id)
		.fetch_all(&mut *conn)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	event.invitees =
		collect_res(rows.iter().map(|row| row.try_get::<String, _>("user_id").map(UserId::from)))?;

	Ok(event)
}

pub(crate) async fn read(db: &SqlitePool, event_id: &EventId) -> ChResult<Event> {
	let mut conn = db.acquire().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	load(&mut conn, event_id.as_str()).await
}

/// Every (event, offset) pair firing in `window`, read in one transaction
/// so the result is a consistent snapshot. Each event is loaded once and
/// shared between its reminders.
pub(crate) async fn query_by_fire_window(
	db: &SqlitePool,
	window: FireWindow,
) -> ChResult<Vec<EventReminder>> {
	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	let rows = sqlx::query(
		"SELECT DISTINCT event_id, offset_secs, fire_at FROM event_reminders
		WHERE fire_at > ?1 AND fire_at <= ?2
		ORDER BY fire_at, event_id",
	)
	.bind(window.after.0)
	.bind(window.until.0)
	.fetch_all(&mut *tx)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	let pairs = collect_res(rows.iter().map(|row| {
		Ok((row.try_get::<String, _>("event_id")?, row.try_get::<i64, _>("offset_secs")?))
	}))?;

	let mut events: HashMap<String, Arc<Event>> = HashMap::new();
	let mut reminders = Vec::with_capacity(pairs.len());
	for (event_id, offset_secs) in pairs {
		let event = match events.get(&event_id) {
			Some(event) => event.clone(),
			None => {
				let event = Arc::new(load(&mut tx, &event_id).await?);
				events.insert(event_id, event.clone());
				event
			}
		};
		reminders.push(EventReminder { event, offset_secs });
	}

	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	debug!(after = %window.after, until = %window.until, due = reminders.len(), "Fire window read");
	Ok(reminders)
}

/// Create or replace an event together with its reminders and invitees
pub(crate) async fn upsert(db: &SqlitePool, event: &Event) -> ChResult<()> {
	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	sqlx::query(
		"INSERT INTO events (event_id, owner_id, title, start_at, timezone)
		VALUES (?1, ?2, ?3, ?4, ?5)
		ON CONFLICT(event_id) DO UPDATE SET owner_id = excluded.owner_id,
			title = excluded.title, start_at = excluded.start_at,
			timezone = excluded.timezone, updated_at = unixepoch()",
	)
	.bind(event.event_id.as_str())
	.bind(event.owner_id.as_str())
	.bind(&*event.title)
	.bind(event.start_at.0)
	.bind(&*event.timezone)
	.execute(&mut *tx)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	sqlx::query("DELETE FROM event_reminders WHERE event_id = ?1")
		.bind(event.event_id.as_str())
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	for (ord, &offset_secs) in event.reminders.iter().enumerate() {
		// Repeated offsets collapse into the first occurrence
		sqlx::query(
			"INSERT OR IGNORE INTO event_reminders (event_id, offset_secs, ord, fire_at)
			VALUES (?1, ?2, ?3, ?4)",
		)
		.bind(event.event_id.as_str())
		.bind(offset_secs)
		.bind(ord as i64)
		.bind(event.fire_at(offset_secs).0)
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	}

	sqlx::query("DELETE FROM event_invitees WHERE event_id = ?1")
		.bind(event.event_id.as_str())
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	for (ord, user_id) in event.invitees.iter().enumerate() {
		sqlx::query(
			"INSERT OR IGNORE INTO event_invitees (event_id, user_id, ord) VALUES (?1, ?2, ?3)",
		)
		.bind(event.event_id.as_str())
		.bind(user_id.as_str())
		.bind(ord as i64)
		.execute(&mut *tx)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	}

	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(())
}

/// Delete an event. Delivery records are kept so a re-created event with the
/// same id does not repeat reminders that were already sent.
pub(crate) async fn delete(db: &SqlitePool, event_id: &EventId) -> ChResult<()> {
	let mut tx = db.begin().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	for table in ["event_reminders", "event_invitees", "events"] {
		sqlx::query(&format!("DELETE FROM {table} WHERE event_id = ?1"))
			.bind(event_id.as_str())
			.execute(&mut *tx)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
	}
	tx.commit().await.inspect_err(inspect).map_err(|_| Error::DbError)?;
	Ok(())
}

// vim: ts=4
