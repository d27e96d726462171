//! Delivery ledger: the durable coordination point between invocations
//!
//! Every invocation of the engine may run concurrently with others and keeps
//! no state of its own. At-most-once delivery therefore rests entirely on the
//! operations below being atomic per task id at the storage layer.

use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::prelude::*;
use crate::types::{CommitResult, DeliveryRecord, ReminderTask, TaskOutcome};

#[async_trait]
pub trait LedgerAdapter: Debug + Send + Sync {
	/// Atomically claims a task for `holder`.
	///
	/// Succeeds only if the task has no record, is pending, or is claimed
	/// with a lease that expired at or before `now`. On success the record is
	/// claimed by `holder` until `now + lease` and its attempt count is
	/// incremented. Returns `false` if someone else holds or finished it.
	async fn claim(
		&self,
		task: &ReminderTask,
		holder: &HolderId,
		lease: Duration,
		now: Timestamp,
	) -> ChResult<bool>;

	/// Records the final outcome of a task.
	///
	/// Applies only while `holder` still owns an unexpired claim; otherwise
	/// nothing is written and `CommitResult::Stale` is returned.
	async fn commit(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		outcome: TaskOutcome,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<CommitResult>;

	/// Gives up a claim early so another invocation may retry at `retry_at`
	/// instead of waiting for the full lease. No-op unless `holder` still owns
	/// an unexpired claim. Returns whether the claim was shortened.
	async fn release(
		&self,
		task_id: &TaskId,
		holder: &HolderId,
		retry_at: Timestamp,
		last_error: Option<&str>,
		now: Timestamp,
	) -> ChResult<bool>;

	/// Reads the records of the given tasks. Missing tasks are omitted.
	async fn read(&self, task_ids: &[TaskId]) -> ChResult<Vec<DeliveryRecord>>;
}

// vim: ts=4
