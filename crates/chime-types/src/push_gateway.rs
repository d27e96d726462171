//! Push gateway abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::{DeviceToken, Platform};

/// Notification payload delivered to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
	/// Notification title
	pub title: String,
	/// Notification body text
	pub body: String,
	/// URL path to open when clicked (optional)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Tag for grouping notifications (optional)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tag: Option<String>,
	/// Free-form data for the client app
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

/// Per-token result reported by a gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
	/// Delivered to the push service
	Success,
	/// Token is permanently invalid (unregistered, expired); prune it
	Invalid,
	/// Permanent rejection that is not the token's fault; not retried
	Rejected(String),
	/// Gateway unavailable, rate-limited, or timed out; may be retried
	Transient(String),
}

impl PushOutcome {
	pub fn is_transient(&self) -> bool {
		matches!(self, PushOutcome::Transient(_))
	}
}

#[async_trait]
pub trait PushGateway: Debug + Send + Sync {
	/// Platform this gateway delivers to
	fn platform(&self) -> Platform;

	/// Sends one payload to a batch of tokens of this gateway's platform.
	///
	/// Returns one outcome per token, in the order of `tokens`. An `Err`
	/// means the whole batch could not be attempted and is treated as
	/// transient for every token.
	async fn send(
		&self,
		tokens: &[DeviceToken],
		payload: &NotificationPayload,
	) -> ChResult<Vec<PushOutcome>>;
}

// vim: ts=4
