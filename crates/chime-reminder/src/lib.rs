//! Reminder scheduling
//!
//! Finds the reminders that are due at an invocation and delivers each of
//! them at most once, no matter how many invocations overlap. All
//! coordination happens through claims in the delivery ledger.
//!
//! # Entry points
//!
//! - `reminder.tick` - periodic trigger
//! - `reminder.event_changed` - an event was created or updated

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod coordinator;
pub mod handler;
pub mod scheduler;

mod prelude;

pub use coordinator::TriggerCoordinator;
pub use scheduler::ReminderScheduler;

use crate::prelude::*;
use chime_core::registry::{BoxFuture, EntryPointRegistry, Invocation, InvocationReport};

fn tick_entry(app: &App, invocation: Invocation) -> BoxFuture<'_, ChResult<InvocationReport>> {
	Box::pin(handler::tick(app, invocation))
}

fn event_changed_entry(app: &App, invocation: Invocation) -> BoxFuture<'_, ChResult<InvocationReport>> {
	Box::pin(handler::event_changed(app, invocation))
}

/// The `reminder.*` entry point group
pub fn entry_points() -> ChResult<EntryPointRegistry> {
	let mut registry = EntryPointRegistry::new();
	registry.register("reminder.tick", Box::new(tick_entry))?;
	registry.register("reminder.event_changed", Box::new(event_changed_entry))?;
	Ok(registry)
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use chime_core::memory::{MemoryEventStore, MemoryGateway, MemoryLedger, MemoryTokenRegistry};
	use chime_core::registry::Trigger;
	use chime_core::{AppState, PushRouter, ReminderConfig};
	use chime_types::push_gateway::PushGateway;
	use chime_types::types::{DeviceToken, Event, ManualClock, Platform};
	use std::{sync::Arc, time::Duration};

	pub fn event(id: &str, start_at: i64, reminders: &[i64], invitees: &[&str]) -> Event {
		Event {
			event_id: id.into(),
			owner_id: "alice".into(),
			title: "Sync".into(),
			start_at: Timestamp(start_at),
			timezone: "UTC".into(),
			reminders: reminders.to_vec(),
			invitees: invitees.iter().map(|u| UserId::from(*u)).collect(),
		}
	}

	pub struct Fixture {
		pub app: App,
		pub clock: Arc<ManualClock>,
		pub events: Arc<MemoryEventStore>,
		pub tokens: Arc<MemoryTokenRegistry>,
		pub ledger: Arc<MemoryLedger>,
		pub gateway: Arc<MemoryGateway>,
	}

	fn test_config() -> ReminderConfig {
		ReminderConfig {
			backoff_min: Duration::from_millis(1),
			backoff_max: Duration::from_millis(4),
			..ReminderConfig::default()
		}
	}

	impl Fixture {
		pub fn new() -> Self {
			Self::build(test_config())
		}

		pub fn with_config(update: impl FnOnce(&mut ReminderConfig)) -> Self {
			let mut config = test_config();
			update(&mut config);
			Self::build(config)
		}

		/// Routes FCM to a custom gateway instead of the memory gateway
		pub fn with_gateway(
			make: impl FnOnce(Arc<ManualClock>, Arc<MemoryLedger>, Duration) -> Arc<dyn PushGateway>,
		) -> Self {
			Self::custom(|_| {}, make)
		}

		pub fn custom(
			update: impl FnOnce(&mut ReminderConfig),
			make: impl FnOnce(Arc<ManualClock>, Arc<MemoryLedger>, Duration) -> Arc<dyn PushGateway>,
		) -> Self {
			let mut config = test_config();
			update(&mut config);
			let clock = ManualClock::new(Timestamp(0));
			let ledger = MemoryLedger::new();
			let gateway = make(clock.clone(), ledger.clone(), config.lease);
			Self::assemble(config, clock, ledger, Some(gateway))
		}

		fn build(config: ReminderConfig) -> Self {
			Self::assemble(config, ManualClock::new(Timestamp(0)), MemoryLedger::new(), None)
		}

		fn assemble(
			config: ReminderConfig,
			clock: Arc<ManualClock>,
			ledger: Arc<MemoryLedger>,
			gateway: Option<Arc<dyn PushGateway>>,
		) -> Self {
			let _ = tracing_subscriber::fmt().with_test_writer().try_init();
			let events = MemoryEventStore::new();
			let tokens = MemoryTokenRegistry::new();
			let memory_gateway = MemoryGateway::new(Platform::Fcm);
			let push = match gateway {
				Some(gateway) => PushRouter::new().with_gateway(gateway),
				None => PushRouter::new().with_gateway(memory_gateway.clone()),
			};
			let app = Arc::new(AppState {
				config,
				clock: clock.clone(),
				event_adapter: events.clone(),
				token_adapter: tokens.clone(),
				ledger_adapter: ledger.clone(),
				push,
			});
			Fixture { app, clock, events, tokens, ledger, gateway: memory_gateway }
		}

		pub fn add_token(&self, user: &str, token: &str) {
			self.tokens.register(DeviceToken { user_id: user.into(), platform: Platform::Fcm, token: token.into() });
		}
	}

	#[tokio::test]
	async fn test_entry_points() {
		let f = Fixture::new();
		f.events.upsert(event("ev1", 1000, &[100], &[]));
		f.add_token("alice", "a1");
		f.clock.set(Timestamp(900));
		let registry = entry_points().unwrap();

		let report = registry.invoke(&f.app, "reminder.tick", Invocation::new(Trigger::Schedule)).await.unwrap();
		assert_eq!(report.sent, 1);

		f.events.upsert(event("ev2", 1000, &[60], &[]));
		f.clock.set(Timestamp(940));
		let invocation =
			Invocation::new(Trigger::EventWrite).with_arg(serde_json::json!({ "eventId": "ev2" }));
		let report = registry.invoke(&f.app, "reminder.event_changed", invocation).await.unwrap();
		assert_eq!(report.candidates, 1);
		assert_eq!(report.sent, 1);

		let invocation = Invocation::new(Trigger::EventWrite).with_arg(serde_json::json!("ev2"));
		let report = registry.invoke(&f.app, "reminder.event_changed", invocation).await.unwrap();
		assert_eq!(report.candidates, 0);

		let missing = Invocation::new(Trigger::EventWrite);
		assert!(registry.invoke(&f.app, "reminder.event_changed", missing).await.is_err());
	}
}

// vim: ts=4
