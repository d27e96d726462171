//! Reminder entry point handlers

use serde::Deserialize;

use crate::coordinator::TriggerCoordinator;
use crate::prelude::*;
use chime_core::registry::{Invocation, InvocationReport};

/// Argument of `reminder.event_changed`: either the bare event id or
/// `{"eventId": ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventChangedArg {
	Id(EventId),
	#[serde(rename_all = "camelCase")]
	Object {
		event_id: EventId,
	},
}

/// `reminder.tick`: the periodic trigger
pub async fn tick(app: &App, invocation: Invocation) -> ChResult<InvocationReport> {
	let coordinator = TriggerCoordinator::new(app);
	debug!(holder = %coordinator.holder(), trigger = ?invocation.trigger, "Reminder tick");
	coordinator.run_tick(app.now()).await
}

/// `reminder.event_changed`: the event-write trigger
pub async fn event_changed(app: &App, invocation: Invocation) -> ChResult<InvocationReport> {
	let event_id = match invocation.parse_arg::<EventChangedArg>()? {
		EventChangedArg::Id(event_id) | EventChangedArg::Object { event_id } => event_id,
	};
	TriggerCoordinator::new(app).on_event_changed(&event_id, app.now()).await
}

// vim: ts=4
