//! Maps device platforms to their push gateways

use std::{collections::BTreeMap, sync::Arc};

use chime_types::push_gateway::PushGateway;
use chime_types::types::Platform;

#[derive(Debug, Default, Clone)]
pub struct PushRouter {
	gateways: BTreeMap<Platform, Arc<dyn PushGateway>>,
}

impl PushRouter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a gateway for its platform, replacing any previous one
	pub fn with_gateway(mut self, gateway: Arc<dyn PushGateway>) -> Self {
		self.add(gateway);
		self
	}

	pub fn add(&mut self, gateway: Arc<dyn PushGateway>) {
		self.gateways.insert(gateway.platform(), gateway);
	}

	pub fn gateway(&self, platform: Platform) -> Option<&Arc<dyn PushGateway>> {
		self.gateways.get(&platform)
	}

	pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
		self.gateways.keys().copied()
	}

	pub fn is_empty(&self) -> bool {
		self.gateways.is_empty()
	}
}

// vim: ts=4
