//! App builder - constructs and runs the Chime engine

use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;

use crate::prelude::*;
pub use chime_core::app::{App, AppState, VERSION};
use chime_core::registry::{EntryPointRegistry, Invocation, InvocationReport, Trigger};
use chime_core::{PushRouter, ReminderConfig};
use chime_types::event_adapter::EventAdapter;
use chime_types::ledger_adapter::LedgerAdapter;
use chime_types::push_gateway::PushGateway;
use chime_types::token_adapter::TokenAdapter;
use chime_types::types::{Clock, SystemClock};

pub const TICK_ENTRY_POINT: &str = "reminder.tick";

#[derive(Debug, Default)]
struct Adapters {
	event_adapter: Option<Arc<dyn EventAdapter>>,
	token_adapter: Option<Arc<dyn TokenAdapter>>,
	ledger_adapter: Option<Arc<dyn LedgerAdapter>>,
}

#[derive(Debug)]
pub struct AppBuilder {
	config: ReminderConfig,
	clock: Arc<dyn Clock>,
	adapters: Adapters,
	push: PushRouter,
}

impl AppBuilder {
	pub fn new() -> Self {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			config: ReminderConfig::default(),
			clock: Arc::new(SystemClock),
			adapters: Adapters::default(),
			push: PushRouter::new(),
		}
	}

	// Config
	pub fn config(&mut self, config: ReminderConfig) -> &mut Self {
		self.config = config;
		self
	}
	pub fn lookahead(&mut self, lookahead: Duration) -> &mut Self {
		self.config.lookahead = lookahead;
		self
	}
	pub fn trigger_interval(&mut self, trigger_interval: Duration) -> &mut Self {
		self.config.trigger_interval = trigger_interval;
		self
	}
	pub fn lease(&mut self, lease: Duration) -> &mut Self {
		self.config.lease = lease;
		self
	}
	pub fn max_concurrency(&mut self, max_concurrency: usize) -> &mut Self {
		self.config.max_concurrency = max_concurrency;
		self
	}
	pub fn max_send_attempts(&mut self, max_send_attempts: u16) -> &mut Self {
		self.config.max_send_attempts = max_send_attempts;
		self
	}
	pub fn max_task_attempts(&mut self, max_task_attempts: u32) -> &mut Self {
		self.config.max_task_attempts = max_task_attempts;
		self
	}
	pub fn gateway_timeout(&mut self, gateway_timeout: Duration) -> &mut Self {
		self.config.gateway_timeout = gateway_timeout;
		self
	}
	pub fn invocation_budget(&mut self, invocation_budget: Duration) -> &mut Self {
		self.config.invocation_budget = invocation_budget;
		self
	}
	pub fn backoff(&mut self, min: Duration, max: Duration) -> &mut Self {
		self.config.backoff_min = min;
		self.config.backoff_max = max;
		self
	}
	pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
		self.clock = clock;
		self
	}

	// Adapters
	pub fn event_adapter(&mut self, event_adapter: Arc<dyn EventAdapter>) -> &mut Self {
		self.adapters.event_adapter = Some(event_adapter);
		self
	}
	pub fn token_adapter(&mut self, token_adapter: Arc<dyn TokenAdapter>) -> &mut Self {
		self.adapters.token_adapter = Some(token_adapter);
		self
	}
	pub fn ledger_adapter(&mut self, ledger_adapter: Arc<dyn LedgerAdapter>) -> &mut Self {
		self.adapters.ledger_adapter = Some(ledger_adapter);
		self
	}
	/// Uses one store for events, tokens and the ledger
	pub fn store<S>(&mut self, store: Arc<S>) -> &mut Self
	where
		S: EventAdapter + TokenAdapter + LedgerAdapter + 'static,
	{
		self.adapters.event_adapter = Some(store.clone());
		self.adapters.token_adapter = Some(store.clone());
		self.adapters.ledger_adapter = Some(store);
		self
	}
	pub fn gateway(&mut self, gateway: Arc<dyn PushGateway>) -> &mut Self {
		self.push.add(gateway);
		self
	}

	pub fn build(self) -> ChResult<Engine> {
		self.config.validate().inspect_err(|e| error!("FATAL: Invalid configuration: {}", e))?;
		if self.config.max_task_attempts > self.config.reachable_task_attempts() {
			warn!(
				"max_task_attempts ({}) exceeds the {} ticks a reminder stays due; failing tasks give up earlier",
				self.config.max_task_attempts,
				self.config.reachable_task_attempts()
			);
		}

		let Some(event_adapter) = self.adapters.event_adapter else {
			error!("FATAL: No event adapter configured");
			return Err(Error::ConfigError("No event adapter configured".to_string()));
		};
		let Some(token_adapter) = self.adapters.token_adapter else {
			error!("FATAL: No token adapter configured");
			return Err(Error::ConfigError("No token adapter configured".to_string()));
		};
		let Some(ledger_adapter) = self.adapters.ledger_adapter else {
			error!("FATAL: No ledger adapter configured");
			return Err(Error::ConfigError("No ledger adapter configured".to_string()));
		};
		if self.push.is_empty() {
			warn!("No push gateway configured, reminders will be marked sent without delivery");
		} else {
			let platforms: Vec<&str> = self.push.platforms().map(|p| p.as_str()).collect();
			info!("Push gateways: {}", platforms.join(", "));
		}

		// Register entry points from all modules
		let mut registry = EntryPointRegistry::new();
		registry.merge(chime_push::entry_points()?)?;
		registry.merge(chime_reminder::entry_points()?)?;
		info!("Registered {} entry points: {}", registry.len(), registry.names().collect::<Vec<_>>().join(", "));

		let app: App = Arc::new(AppState {
			config: self.config,
			clock: self.clock,
			event_adapter,
			token_adapter,
			ledger_adapter,
			push: self.push,
		});
		Ok(Engine { app, registry: Arc::new(registry) })
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// A built engine: the app state plus the merged entry point registry
#[derive(Debug, Clone)]
pub struct Engine {
	app: App,
	registry: Arc<EntryPointRegistry>,
}

impl Engine {
	pub fn app(&self) -> &App {
		&self.app
	}

	pub fn registry(&self) -> &EntryPointRegistry {
		&self.registry
	}

	/// Invokes an entry point by name
	pub async fn invoke(&self, name: &str, invocation: Invocation) -> ChResult<InvocationReport> {
		self.registry.invoke(&self.app, name, invocation).await
	}

	/// Runs one periodic invocation
	pub async fn tick(&self) -> ChResult<InvocationReport> {
		self.invoke(TICK_ENTRY_POINT, Invocation::new(Trigger::Schedule)).await
	}

	/// Runs the periodic trigger until `shutdown` completes.
	///
	/// Every tick is spawned on its own, so a slow invocation never delays
	/// the next one; overlapping invocations coordinate through the ledger.
	pub async fn run(&self, shutdown: impl Future<Output = ()>) -> ChResult<()> {
		info!("Chime V{}", VERSION);
		info!(
			"Trigger every {}s, lookahead {}s, lease {}s",
			self.app.config.trigger_interval.as_secs(),
			self.app.config.lookahead.as_secs(),
			self.app.config.lease.as_secs()
		);

		let mut interval = tokio::time::interval(self.app.config.trigger_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				() = &mut shutdown => {
					info!("Shutting down periodic trigger");
					return Ok(());
				}
				_ = interval.tick() => {
					let engine = self.clone();
					tokio::spawn(async move {
						match engine.tick().await {
							Ok(report) => debug!(
								"Tick report: {}",
								serde_json::to_string(&report).unwrap_or_default()
							),
							Err(e) => warn!("Tick failed, retrying next interval: {}", e),
						}
					});
				}
			}
		}
	}
}


// vim: ts=4
