//! App state type

use std::sync::Arc;

use crate::push_router::PushRouter;
use crate::settings::ReminderConfig;

use chime_types::event_adapter::EventAdapter;
use chime_types::ledger_adapter::LedgerAdapter;
use chime_types::token_adapter::TokenAdapter;
use chime_types::types::{Clock, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub config: ReminderConfig,
	pub clock: Arc<dyn Clock>,

	pub event_adapter: Arc<dyn EventAdapter>,
	pub token_adapter: Arc<dyn TokenAdapter>,
	pub ledger_adapter: Arc<dyn LedgerAdapter>,

	pub push: PushRouter,
}

impl AppState {
	pub fn now(&self) -> Timestamp {
		self.clock.now()
	}
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState")
			.field("config", &self.config)
			.field("clock", &self.clock)
			.field("push", &self.push)
			.finish_non_exhaustive()
	}
}

pub type App = Arc<AppState>;

// vim: ts=4
