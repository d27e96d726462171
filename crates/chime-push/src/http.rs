//! HTTPS client shared by the gateways

use futures::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use std::future::Future;

use crate::prelude::*;
use chime_types::push_gateway::PushOutcome;
use chime_types::types::DeviceToken;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Single-token requests a gateway keeps in flight for one batch
pub const MAX_PARALLEL_REQUESTS: usize = 16;

/// Builds an HTTPS-only client. With `http2_only` the connection is
/// negotiated as HTTP/2 (required by most Web Push services).
pub fn https_client(http2_only: bool) -> ChResult<HttpsClient> {
	let builder = HttpsConnectorBuilder::new()
		.with_native_roots()
		.map_err(|e| Error::ConfigError(format!("TLS error: {}", e)))?
		.https_only();
	let connector = if http2_only {
		builder.enable_http2().build()
	} else {
		builder.enable_all_versions().build()
	};

	Ok(Client::builder(TokioExecutor::new()).http2_only(http2_only).build(connector))
}

/// Collects a response body as text, lossy. Used only for diagnostics.
pub async fn body_text(body: hyper::body::Incoming) -> String {
	match body.collect().await {
		Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
		Err(_) => String::new(),
	}
}

/// Sends one request per token with at most `limit` in flight. Outcomes are
/// returned in token order.
pub async fn send_each<'a, F, Fut>(tokens: &'a [DeviceToken], limit: usize, send: F) -> Vec<PushOutcome>
where
	F: FnMut(&'a DeviceToken) -> Fut + Send + 'a,
	Fut: Future<Output = PushOutcome> + Send + 'a,
{
	// Boxed so the closure type doesn't leak into callers' `Send` checks
	let requests: std::pin::Pin<Box<dyn futures::Stream<Item = Fut> + Send + 'a>> =
		Box::pin(futures::stream::iter(tokens).map(send));
	requests.buffered(limit.max(1)).collect().await
}

#[cfg(test)]
mod tests {
	use super::*;
	use chime_types::types::Platform;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	#[tokio::test]
	async fn test_send_each_bounds_requests_in_flight() {
		let tokens: Vec<DeviceToken> = (0..40)
			.map(|i| DeviceToken {
				user_id: "alice".into(),
				platform: Platform::Fcm,
				token: format!("t{}", i).into(),
			})
			.collect();
		let in_flight = AtomicUsize::new(0);
		let peak = AtomicUsize::new(0);

		let outcomes = send_each(&tokens, 4, |token| {
			let (in_flight, peak) = (&in_flight, &peak);
			async move {
				let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
				peak.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(2)).await;
				in_flight.fetch_sub(1, Ordering::SeqCst);
				if token.token.ends_with('7') {
					PushOutcome::Invalid
				} else {
					PushOutcome::Success
				}
			}
		})
		.await;

		assert_eq!(outcomes.len(), 40);
		assert!(peak.load(Ordering::SeqCst) <= 4);
		assert_eq!(outcomes[7], PushOutcome::Invalid);
		assert_eq!(outcomes[8], PushOutcome::Success);
	}
}

// vim: ts=4
