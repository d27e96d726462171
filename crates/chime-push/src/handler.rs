//! Push entry point handlers

use serde::Deserialize;
use tokio::time::Instant;

use crate::dispatch::NotificationDispatcher;
use crate::prelude::*;
use chime_core::registry::{Invocation, InvocationReport};
use chime_types::push_gateway::NotificationPayload;
use chime_types::types::TaskOutcome;

/// Argument of `push.notify_user`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyUserArg {
	pub user_id: UserId,
	#[serde(flatten)]
	pub payload: NotificationPayload,
}

/// `push.notify_user`: sends an ad-hoc notification to every device of one
/// user. No ledger record is involved, so a repeated invocation sends again.
pub async fn notify_user(app: &App, invocation: Invocation) -> ChResult<InvocationReport> {
	let arg: NotifyUserArg = invocation.parse_arg()?;
	if arg.payload.title.is_empty() {
		return Err(Error::ValidationError("notification title is empty".into()));
	}
	info!(user_id = %arg.user_id, "Sending ad-hoc notification");

	let deadline = Instant::now() + app.config.invocation_budget;
	let report = NotificationDispatcher::new(app, deadline)
		.send_to_users(std::slice::from_ref(&arg.user_id), &arg.payload)
		.await?;

	let mut res = InvocationReport { candidates: 1, ..Default::default() };
	match report.outcome() {
		TaskOutcome::Sent => res.sent = 1,
		TaskOutcome::Failed => res.failed = 1,
	}
	Ok(res)
}


// vim: ts=4
