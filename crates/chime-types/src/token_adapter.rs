//! Device token registry

use async_trait::async_trait;
use std::fmt::Debug;

use crate::prelude::*;
use crate::types::DeviceToken;

#[async_trait]
pub trait TokenAdapter: Debug + Send + Sync {
	/// Lists the valid push destinations of a user
	async fn tokens_for(&self, user_id: &UserId) -> ChResult<Vec<DeviceToken>>;

	/// Marks a token invalid after a terminal gateway rejection.
	/// Invalidated tokens are no longer returned by `tokens_for`.
	async fn invalidate(&self, token: &DeviceToken) -> ChResult<()>;
}

// vim: ts=4
