//! Delivery ledger
//!
//! Each operation is a single conditional statement, so SQLite's write lock
//! makes it atomic per task id without explicit transactions.

use std::time::Duration;

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::utils::{collect_res, inspect, push_in};
use chime_types::prelude::*;
use chime_types::types::{CommitResult, DeliveryRecord, DeliveryStatus, ReminderTask, TaskOutcome};

/// Maximum bound parameters per `IN` list
const READ_CHUNK: usize = 500;

fn status_char(status: DeliveryStatus) -> String {
	status.as_char().to_string()
}

fn parse_record(row: &SqliteRow) -> Result<DeliveryRecord, sqlx::Error> {
	let status: String = row.try_get("status")?;
	let status = status.chars().next().and_then(DeliveryStatus::from_char).ok_or_else(|| {
		sqlx::Error::ColumnDecode {
			index: "status".into(),
			source: format!("invalid delivery status {:?}", status).into(),
		}
	})?;
	Ok(DeliveryRecord {
		task_id: row.try_get::<String, _>("task_id")?.into(),
		event_id: row.try_get::<String, _>("event_id")?.into(),
		fire_at: Timestamp(row.try_get("fire_at")?),
		status,
		holder: row.try_get::<Option<String>, _>("holder")?.map(HolderId::from),
		claim_expires_at: row.try_get::<Option<i64>, _>("claim_expires_at")?.map(Timestamp),
		attempts: u32::try_from(row.try_get::<i64, _>("attempts")?).unwrap_or(u32::MAX),
		last_error: row.try_get::<Option<String>, _>("last_error")?.map(Into::into),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

pub(crate) async fn claim(
	db: &SqlitePool,
	task: &ReminderTask,
	holder: &HolderId,
	lease: Duration,
	now: Timestamp,
) -> ChResult<bool> {
	let expires = now.add_duration(lease);
	let res = sqlx::query(
		"INSERT INTO deliveries (task_id, event_id, fire_at, status, holder, claim_expires_at,
			attempts, updated_at)
		VALUES (?1, ?2, ?3, 'C', ?4, ?5, 1, ?6)
		ON CONFLICT(task_id) DO UPDATE SET status = 'C', holder = excluded.holder,
			claim_expires_at = excluded.claim_expires_at, attempts = deliveries.attempts + 1,
			fire_at = excluded.fire_at, updated_at = excluded.updated_at
		WHERE deliveries.status = 'P'
			OR (deliveries.status = 'C' AND deliveries.claim_expires_at <= ?6)",
	)
	.bind(task.task_id.as_str())
	.bind(task.event.event_id.as_str())
	.bind(task.fire_at.0)
	.bind(holder.as_str())
	.bind(expires.0)
	.bind(now.0)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let claimed = res.rows_affected() == 1;
	debug!(task_id = %task.task_id, holder = %holder, claimed, "Claim attempt");
	Ok(claimed)
}

pub(crate) async fn commit(
	db: &SqlitePool,
	task_id: &TaskId,
	holder: &HolderId,
	outcome: TaskOutcome,
	last_error: Option<&str>,
	now: Timestamp,
) -> ChResult<CommitResult> {
	let res = sqlx::query(
		"UPDATE deliveries SET status = ?1, last_error = ?2, updated_at = ?3
		WHERE task_id = ?4 AND status = 'C' AND holder = ?5 AND claim_expires_at > ?3",
	)
	.bind(status_char(outcome.into()))
	.bind(last_error)
	.bind(now.0)
	.bind(task_id.as_str())
	.bind(holder.as_str())
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(if res.rows_affected() == 1 { CommitResult::Committed } else { CommitResult::Stale })
}

pub(crate) async fn release(
	db: &SqlitePool,
	task_id: &TaskId,
	holder: &HolderId,
	retry_at: Timestamp,
	last_error: Option<&str>,
	now: Timestamp,
) -> ChResult<bool> {
	let res = sqlx::query(
		"UPDATE deliveries SET claim_expires_at = MIN(claim_expires_at, ?1), last_error = ?2,
			updated_at = ?3
		WHERE task_id = ?4 AND status = 'C' AND holder = ?5 AND claim_expires_at > ?3",
	)
	.bind(retry_at.0)
	.bind(last_error)
	.bind(now.0)
	.bind(task_id.as_str())
	.bind(holder.as_str())
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() == 1)
}

pub(crate) async fn read(db: &SqlitePool, task_ids: &[TaskId]) -> ChResult<Vec<DeliveryRecord>> {
	let mut records = Vec::with_capacity(task_ids.len());
	for chunk in task_ids.chunks(READ_CHUNK) {
		let mut query = sqlx::QueryBuilder::new(
			"SELECT task_id, event_id, fire_at, status, holder, claim_expires_at, attempts,
				last_error, updated_at
			FROM deliveries WHERE task_id IN ",
		);
		push_in(&mut query, chunk.iter().map(TaskId::as_str));
		let rows = query
			.build()
			.fetch_all(db)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;
		records.extend(collect_res(rows.iter().map(parse_record))?);
	}
	Ok(records)
}

// vim: ts=4
