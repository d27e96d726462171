//! Read-only access to persisted events

use async_trait::async_trait;
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::{Event, EventReminder, FireWindow};

#[async_trait]
pub trait EventAdapter: Debug + Send + Sync {
	/// Returns every (event, offset) pair whose fire time falls in `window`.
	///
	/// Either the whole window is read or the call fails; a partial read
	/// must never be returned because it would silently skip reminders.
	async fn query_by_fire_window(&self, window: FireWindow) -> ChResult<Vec<EventReminder>>;

	/// Reads one event. Returns `Error::NotFound` if it does not exist.
	async fn read_event(&self, event_id: &EventId) -> ChResult<Event>;
}

// vim: ts=4
