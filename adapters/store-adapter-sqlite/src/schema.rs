//! Database schema initialization and migrations

use sqlx::{Sqlite, SqlitePool, Transaction};

/// Get the current database version from vars table
async fn get_db_version(tx: &mut Transaction<'_, Sqlite>) -> i64 {
	sqlx::query_scalar::<_, String>("SELECT value FROM vars WHERE key = 'db_version'")
		.fetch_optional(&mut **tx)
		.await
		.ok()
		.flatten()
		.and_then(|v| v.parse().ok())
		.unwrap_or(0)
}

/// Set the database version in vars table
async fn set_db_version(tx: &mut Transaction<'_, Sqlite>, version: i64) -> Result<(), sqlx::Error> {
	sqlx::query("INSERT OR REPLACE INTO vars (key, value) VALUES ('db_version', ?)")
		.bind(version.to_string())
		.execute(&mut **tx)
		.await?;
	Ok(())
}

// Current schema version - update this when adding new migrations
const CURRENT_DB_VERSION: i64 = 1;

/// Initialize the database schema and run migrations
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Create vars table first (needed for version tracking)
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vars (
		key text NOT NULL,
		value text NOT NULL,
		created_at INTEGER DEFAULT (unixepoch()),
		updated_at INTEGER DEFAULT (unixepoch()),
		PRIMARY KEY(key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	let version = get_db_version(&mut tx).await;

	// Schema creation - safe to run every time (uses IF NOT EXISTS)

	// Events
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS events (
			event_id text NOT NULL,
			owner_id text NOT NULL,
			title text NOT NULL,
			start_at INTEGER NOT NULL,
			timezone text NOT NULL DEFAULT 'UTC',
			created_at INTEGER DEFAULT (unixepoch()),
			updated_at INTEGER DEFAULT (unixepoch()),
			PRIMARY KEY(event_id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	// Reminder offsets, with the fire time denormalized for window queries
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS event_reminders (
			event_id text NOT NULL,
			offset_secs INTEGER NOT NULL,
			ord INTEGER NOT NULL,
			fire_at INTEGER NOT NULL,
			PRIMARY KEY(event_id, offset_secs)
		)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_event_reminders_fire_at ON event_reminders(fire_at)",
	)
	.execute(&mut *tx)
	.await?;

	// Invitees
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS event_invitees (
			event_id text NOT NULL,
			user_id text NOT NULL,
			ord INTEGER NOT NULL,
			PRIMARY KEY(event_id, user_id)
		)",
	)
	.execute(&mut *tx)
	.await?;

	// Device tokens
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS device_tokens (
			user_id text NOT NULL,
			platform text NOT NULL,
			token text NOT NULL,
			invalid_at INTEGER,
			created_at INTEGER DEFAULT (unixepoch()),
			updated_at INTEGER DEFAULT (unixepoch()),
			PRIMARY KEY(user_id, platform, token)
		)",
	)
	.execute(&mut *tx)
	.await?;

	// Delivery ledger
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS deliveries (
			task_id text NOT NULL,
			event_id text NOT NULL,
			fire_at INTEGER NOT NULL,
			status char(1) NOT NULL,
			holder text,
			claim_expires_at INTEGER,
			attempts INTEGER NOT NULL DEFAULT 0,
			last_error text,
			created_at INTEGER DEFAULT (unixepoch()),
			updated_at INTEGER NOT NULL,
			PRIMARY KEY(task_id)
		)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_deliveries_event ON deliveries(event_id)")
		.execute(&mut *tx)
		.await?;

	// Migrations
	//************

	if version < CURRENT_DB_VERSION {
		set_db_version(&mut tx, CURRENT_DB_VERSION).await?;
	}

	tx.commit().await?;
	Ok(())
}

// vim: ts=4
