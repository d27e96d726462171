//! Push notification module
//!
//! Delivers reminder notifications to the devices of an event's audience.
//!
//! # Features
//!
//! - Per-platform batching through the app's `PushRouter`
//! - Per-token outcome classification with bounded transient retries
//! - Pruning of permanently invalid device tokens
//! - Web Push gateway: VAPID authentication (RFC 8292) and message
//!   encryption (RFC 8188, 8291)
//! - FCM HTTP v1 gateway
//!
//! # Entry points
//!
//! - `push.notify_user` - sends an ad-hoc notification to one user's devices

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod dispatch;
pub mod fcm;
pub mod handler;
pub mod payload;
pub mod webpush;

mod http;
mod prelude;

pub use dispatch::{DispatchReport, NotificationDispatcher};
pub use fcm::FcmGateway;
pub use payload::reminder_payload;
pub use webpush::{VapidKey, WebPushGateway};

use crate::prelude::*;
use chime_core::registry::{BoxFuture, EntryPointRegistry, Invocation, InvocationReport};

fn notify_user_entry(app: &App, invocation: Invocation) -> BoxFuture<'_, ChResult<InvocationReport>> {
	Box::pin(handler::notify_user(app, invocation))
}

/// The `push.*` entry point group
pub fn entry_points() -> ChResult<EntryPointRegistry> {
	let mut registry = EntryPointRegistry::new();
	registry.register("push.notify_user", Box::new(notify_user_entry))?;
	Ok(registry)
}

// vim: ts=4
