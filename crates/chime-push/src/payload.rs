//! Reminder notification payload

use chime_types::push_gateway::NotificationPayload;
use chime_types::types::ReminderTask;

/// Human readable form of a reminder offset, e.g. "1 hour 30 minutes"
pub fn format_offset(offset_secs: i64) -> String {
	fn unit(value: i64, name: &str) -> String {
		if value == 1 { format!("1 {}", name) } else { format!("{} {}s", value, name) }
	}

	if offset_secs < 60 {
		return unit(offset_secs.max(0), "second");
	}
	let days = offset_secs / 86_400;
	let hours = offset_secs % 86_400 / 3600;
	let minutes = offset_secs % 3600 / 60;

	let parts: Vec<String> = [(days, "day"), (hours, "hour"), (minutes, "minute")]
		.into_iter()
		.filter(|(value, _)| *value > 0)
		.map(|(value, name)| unit(value, name))
		.collect();
	parts.join(" ")
}

/// Builds the notification sent for one reminder task.
///
/// The task id is used as the notification tag so a client that receives a
/// duplicate (e.g. after a lost commit) replaces instead of stacking it.
pub fn reminder_payload(task: &ReminderTask) -> NotificationPayload {
	let event = &task.event;
	let body = if task.offset_secs <= 0 {
		format!("{} is starting now", event.title)
	} else {
		format!("{} starts in {}", event.title, format_offset(task.offset_secs))
	};

	let mut data = serde_json::Map::new();
	data.insert("eventId".into(), event.event_id.as_str().into());
	data.insert("startAt".into(), event.start_at.0.into());
	if let Some(start) = chrono::DateTime::from_timestamp(event.start_at.0, 0) {
		data.insert("startAtIso".into(), start.to_rfc3339().into());
	}
	data.insert("timezone".into(), event.timezone.to_string().into());
	data.insert("offset".into(), task.offset_secs.into());

	NotificationPayload {
		title: event.title.to_string(),
		body,
		path: Some(format!("/events/{}", event.event_id)),
		tag: Some(task.task_id.to_string()),
		data,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chime_types::types::{Event, Timestamp};
	use std::sync::Arc;

	#[test]
	fn test_format_offset() {
		assert_eq!(format_offset(30), "30 seconds");
		assert_eq!(format_offset(60), "1 minute");
		assert_eq!(format_offset(1800), "30 minutes");
		assert_eq!(format_offset(5400), "1 hour 30 minutes");
		assert_eq!(format_offset(2 * 86_400 + 3600), "2 days 1 hour");
	}

	#[test]
	fn test_reminder_payload() {
		let event = Event {
			event_id: "ev1".into(),
			owner_id: "alice".into(),
			title: "Planning".into(),
			start_at: Timestamp(1_700_000_000),
			timezone: "Europe/Budapest".into(),
			reminders: vec![900],
			invitees: vec![],
		};
		let task = ReminderTask::new(Arc::new(event), 900);
		let payload = reminder_payload(&task);

		assert_eq!(payload.title, "Planning");
		assert_eq!(payload.body, "Planning starts in 15 minutes");
		assert_eq!(payload.tag.as_deref(), Some(task.task_id.as_str()));
		assert_eq!(payload.data["eventId"], "ev1");
		assert_eq!(payload.data["timezone"], "Europe/Budapest");
		assert_eq!(payload.data["startAtIso"], "2023-11-14T22:13:20+00:00");
	}
}

// vim: ts=4
