//! Web Push gateway
//!
//! Implements RFC 8030 (HTTP/2 Push), RFC 8188 (Encrypted Content-Encoding),
//! RFC 8291 (Message Encryption for Web Push), and RFC 8292 (VAPID).
//!
//! The device token of a `WebPush` device is the browser's JSON
//! subscription: `{"endpoint": ..., "keys": {"p256dh": ..., "auth": ...}}`.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use http_body_util::Full;
use hyper::{StatusCode, body::Bytes};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::{HttpsClient, MAX_PARALLEL_REQUESTS, body_text, https_client, send_each};
use crate::prelude::*;
use chime_types::push_gateway::{NotificationPayload, PushGateway, PushOutcome};
use chime_types::types::{DeviceToken, Platform};

/// Lifetime of the VAPID JWT
const VAPID_JWT_TTL: Duration = Duration::from_secs(12 * 3600);
/// Time the push service keeps an undelivered message
const PUSH_TTL_SECS: u32 = 86_400;

/// Browser push subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPushSubscription {
	pub endpoint: String,
	pub keys: WebPushKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPushKeys {
	/// P-256 public key (base64url encoded)
	pub p256dh: String,
	/// Auth secret (base64url encoded)
	pub auth: String,
}

/// VAPID signing key
pub struct VapidKey {
	encoding_key: EncodingKey,
	/// Uncompressed public point, base64url encoded
	public_key: String,
}

impl std::fmt::Debug for VapidKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VapidKey").field("public_key", &self.public_key).finish_non_exhaustive()
	}
}

impl VapidKey {
	/// Loads a key from the raw 32-byte P-256 scalar, base64url encoded.
	/// The public key is derived from it.
	pub fn from_private(private_key_raw: &str) -> ChResult<Self> {
		let private_key_bytes = URL_SAFE_NO_PAD
			.decode(private_key_raw.trim())
			.map_err(|e| Error::ConfigError(format!("invalid base64url VAPID key: {}", e)))?;
		let secret_key = p256::SecretKey::from_slice(&private_key_bytes)
			.map_err(|_| Error::ConfigError("invalid P-256 VAPID private key".into()))?;

		let pem = secret_key
			.to_pkcs8_pem(LineEnding::LF)
			.map_err(|e| Error::ConfigError(format!("failed to encode VAPID key: {}", e)))?;
		let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())
			.map_err(|e| Error::ConfigError(format!("invalid VAPID private key: {}", e)))?;

		let public_point = secret_key.public_key().to_encoded_point(false);
		let public_key = URL_SAFE_NO_PAD.encode(public_point.as_bytes());

		Ok(Self { encoding_key, public_key })
	}

	/// Application server key handed to browsers when they subscribe
	pub fn public_key(&self) -> &str {
		&self.public_key
	}

	/// Creates the VAPID JWT for one push service origin
	fn jwt(&self, endpoint: &str, subject: &str) -> Result<String, String> {
		#[derive(Serialize)]
		struct VapidClaims<'a> {
			aud: String,
			exp: u64,
			sub: &'a str,
		}

		let url = url::Url::parse(endpoint).map_err(|e| format!("invalid endpoint URL: {}", e))?;
		let host = url.host_str().ok_or("endpoint URL has no host")?;
		let audience = match url.port() {
			Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
			None => format!("{}://{}", url.scheme(), host),
		};
		let exp = chrono::Utc::now().timestamp().max(0) as u64 + VAPID_JWT_TTL.as_secs();

		let claims = VapidClaims { aud: audience, exp, sub: subject };
		jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)
			.map_err(|e| format!("JWT encoding failed: {}", e))
	}
}

/// Encrypts the payload for one subscription (aes128gcm, RFC 8188/8291)
fn encrypt_payload(payload: &[u8], keys: &WebPushKeys) -> Result<Vec<u8>, String> {
	let p256dh = URL_SAFE_NO_PAD.decode(&keys.p256dh).map_err(|e| format!("invalid p256dh: {}", e))?;
	let auth = URL_SAFE_NO_PAD.decode(&keys.auth).map_err(|e| format!("invalid auth: {}", e))?;

	// Result is a complete aes128gcm body: salt, record size, key id, ciphertext
	ece::encrypt(&p256dh, &auth, payload).map_err(|e| format!("ECE encryption failed: {:?}", e))
}

/// Maps a push service response status to a per-token outcome
pub fn classify_status(status: StatusCode, body: &str) -> PushOutcome {
	match status {
		s if s.is_success() => PushOutcome::Success,
		StatusCode::NOT_FOUND | StatusCode::GONE => PushOutcome::Invalid,
		StatusCode::TOO_MANY_REQUESTS => PushOutcome::Transient(format!("HTTP {}", status)),
		s if s.is_server_error() => PushOutcome::Transient(format!("HTTP {}", status)),
		_ => PushOutcome::Rejected(format!("HTTP {}: {}", status, body.trim())),
	}
}

pub struct WebPushGateway {
	vapid: VapidKey,
	/// VAPID subject, a `mailto:` or `https:` contact URI
	subject: String,
	client: HttpsClient,
}

impl std::fmt::Debug for WebPushGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebPushGateway")
			.field("vapid", &self.vapid)
			.field("subject", &self.subject)
			.finish_non_exhaustive()
	}
}

impl WebPushGateway {
	pub fn new(vapid: VapidKey, subject: impl Into<String>) -> ChResult<Self> {
		let subject = subject.into();
		if !subject.starts_with("mailto:") && !subject.starts_with("https:") {
			return Err(Error::ConfigError(format!(
				"VAPID subject must be a mailto: or https: URI, got {:?}",
				subject
			)));
		}
		Ok(Self { vapid, subject, client: https_client(true)? })
	}

	async fn send_one(&self, token: &DeviceToken, payload_json: &[u8]) -> PushOutcome {
		let subscription: WebPushSubscription = match serde_json::from_str(&token.token) {
			Ok(subscription) => subscription,
			Err(e) => {
				warn!(user_id = %token.user_id, error = %e, "Malformed Web Push subscription");
				return PushOutcome::Invalid;
			}
		};

		let body = match encrypt_payload(payload_json, &subscription.keys) {
			Ok(body) => body,
			// Broken subscription keys never get better
			Err(e) => {
				warn!(user_id = %token.user_id, error = %e, "Unusable Web Push subscription keys");
				return PushOutcome::Invalid;
			}
		};
		let jwt = match self.vapid.jwt(&subscription.endpoint, &self.subject) {
			Ok(jwt) => jwt,
			Err(e) => return PushOutcome::Rejected(format!("VAPID JWT error: {}", e)),
		};

		let request = match hyper::Request::builder()
			.method(hyper::Method::POST)
			.uri(&subscription.endpoint)
			.header("Content-Type", "application/octet-stream")
			.header("Content-Encoding", "aes128gcm")
			.header("TTL", PUSH_TTL_SECS.to_string())
			.header("Urgency", "high")
			.header("Authorization", format!("vapid t={},k={}", jwt, self.vapid.public_key))
			.body(Full::new(Bytes::from(body)))
		{
			Ok(req) => req,
			Err(e) => return PushOutcome::Rejected(format!("request build error: {}", e)),
		};

		match self.client.request(request).await {
			Ok(response) => {
				let status = response.status();
				let body = if status.is_client_error() {
					body_text(response.into_body()).await
				} else {
					String::new()
				};
				classify_status(status, &body)
			}
			Err(e) => PushOutcome::Transient(format!("network error: {}", e)),
		}
	}
}

#[async_trait]
impl PushGateway for WebPushGateway {
	fn platform(&self) -> Platform {
		Platform::WebPush
	}

	async fn send(
		&self,
		tokens: &[DeviceToken],
		payload: &NotificationPayload,
	) -> ChResult<Vec<PushOutcome>> {
		let payload_json = serde_json::to_vec(payload)?;
		let outcomes =
			send_each(tokens, MAX_PARALLEL_REQUESTS, |token| self.send_one(token, &payload_json)).await;
		Ok(outcomes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Scalar 0x01..=0x20, valid for P-256
	const TEST_KEY: &str = "AQIDBAUGBwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyA";

	#[test]
	fn test_classify_status() {
		assert_eq!(classify_status(StatusCode::CREATED, ""), PushOutcome::Success);
		assert_eq!(classify_status(StatusCode::GONE, ""), PushOutcome::Invalid);
		assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), PushOutcome::Invalid);
		assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
		assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
		assert!(matches!(
			classify_status(StatusCode::PAYLOAD_TOO_LARGE, "too big"),
			PushOutcome::Rejected(reason) if reason.contains("too big")
		));
	}

	#[test]
	fn test_vapid_key_derives_public_key() {
		let key = VapidKey::from_private(TEST_KEY).unwrap();
		let public = URL_SAFE_NO_PAD.decode(key.public_key()).unwrap();
		assert_eq!(public.len(), 65);
		assert_eq!(public[0], 0x04);

		assert!(VapidKey::from_private("not base64!").is_err());
		assert!(VapidKey::from_private("AAAA").is_err());
	}

	#[test]
	fn test_vapid_jwt_audience_is_origin() {
		let key = VapidKey::from_private(TEST_KEY).unwrap();
		let jwt = key.jwt("https://push.example.com/send/abc", "mailto:ops@example.com").unwrap();
		let claims = jwt.split('.').nth(1).unwrap();
		let claims: serde_json::Value =
			serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims).unwrap()).unwrap();
		assert_eq!(claims["aud"], "https://push.example.com");
		assert_eq!(claims["sub"], "mailto:ops@example.com");

		assert!(key.jwt("not a url", "mailto:ops@example.com").is_err());
	}
}

// vim: ts=4
