//! Registry of named entry points
//!
//! Each feature crate contributes a group of handlers (`push.*`,
//! `reminder.*`). The groups are merged into one registry that the hosting
//! runtime invokes by name. Merging rejects duplicate names instead of
//! silently letting one group shadow another.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, pin::Pin};
use tracing::Instrument;

use crate::prelude::*;

/// What caused an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
	/// Fixed-interval timer
	Schedule,
	/// An event was created or updated
	EventWrite,
	/// Operator or API call
	Manual,
}

#[derive(Debug, Clone)]
pub struct Invocation {
	pub trigger: Trigger,
	pub arg: Option<serde_json::Value>,
}

impl Invocation {
	pub fn new(trigger: Trigger) -> Self {
		Self { trigger, arg: None }
	}

	pub fn with_arg(mut self, arg: serde_json::Value) -> Self {
		self.arg = Some(arg);
		self
	}

	/// Deserializes the invocation argument
	pub fn parse_arg<T: serde::de::DeserializeOwned>(&self) -> ChResult<T> {
		let Some(arg) = &self.arg else {
			return Err(Error::ValidationError("missing invocation argument".into()));
		};
		serde_json::from_value(arg.clone())
			.map_err(|e| Error::ValidationError(format!("invalid invocation argument: {}", e)))
	}
}

/// Aggregate result returned to the external trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationReport {
	/// Tasks considered in this invocation
	pub candidates: usize,
	/// Tasks committed as sent
	pub sent: usize,
	/// Tasks committed as failed (terminal)
	pub failed: usize,
	/// Tasks released after transient failures, to be retried later
	pub retrying: usize,
	/// Tasks skipped: claim denied, stale commit, or out of time budget
	pub skipped: usize,
	/// Unexpected per-task errors (ledger or registry failures)
	pub errors: usize,
	/// Claim holder token of the invocation, if it took claims
	#[serde(skip_serializing_if = "Option::is_none")]
	pub holder: Option<HolderId>,
}

impl InvocationReport {
	pub fn merge(&mut self, other: &InvocationReport) {
		self.candidates += other.candidates;
		self.sent += other.sent;
		self.failed += other.failed;
		self.retrying += other.retrying;
		self.skipped += other.skipped;
		self.errors += other.errors;
		if self.holder.is_none() {
			self.holder.clone_from(&other.holder);
		}
	}
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased entry point handler
pub type EntryPointFn =
	Box<dyn for<'a> Fn(&'a App, Invocation) -> BoxFuture<'a, ChResult<InvocationReport>> + Send + Sync>;

#[derive(Default)]
pub struct EntryPointRegistry {
	entries: BTreeMap<Box<str>, EntryPointFn>,
}

impl std::fmt::Debug for EntryPointRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list().entries(self.entries.keys()).finish()
	}
}

impl EntryPointRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers one entry point. Fails if the name is already taken.
	pub fn register(&mut self, name: impl Into<Box<str>>, handler: EntryPointFn) -> ChResult<()> {
		let name = name.into();
		if self.entries.contains_key(&name) {
			return Err(Error::ConfigError(format!("entry point {} registered twice", name)));
		}
		debug!("Registered entry point {}", name);
		self.entries.insert(name, handler);
		Ok(())
	}

	/// Merges another registry (a handler group) into this one
	pub fn merge(&mut self, group: EntryPointRegistry) -> ChResult<()> {
		if let Some(dup) = group.entries.keys().find(|name| self.entries.contains_key(*name)) {
			return Err(Error::ConfigError(format!("entry point {} registered twice", dup)));
		}
		self.entries.extend(group.entries);
		Ok(())
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(AsRef::as_ref)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub async fn invoke(
		&self,
		app: &App,
		name: &str,
		invocation: Invocation,
	) -> ChResult<InvocationReport> {
		let Some(handler) = self.entries.get(name) else {
			warn!("Unknown entry point {}", name);
			return Err(Error::NotFound);
		};
		let span = info_span!("invoke", entry = name, trigger = ?invocation.trigger);
		handler(app, invocation).instrument(span).await
	}
}


// vim: ts=4
