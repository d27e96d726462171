//! Firebase Cloud Messaging gateway (HTTP v1 API)
//!
//! FCM v1 accepts one registration token per request, so a batch is sent as
//! single-token requests with a bounded number in flight. The OAuth access token is supplied by
//! the operator; minting it from a service account is left to the deployment.

use async_trait::async_trait;
use http_body_util::Full;
use hyper::{StatusCode, body::Bytes};
use serde::Deserialize;
use serde_json::json;

use crate::http::{HttpsClient, MAX_PARALLEL_REQUESTS, body_text, https_client, send_each};
use crate::prelude::*;
use chime_types::push_gateway::{NotificationPayload, PushGateway, PushOutcome};
use chime_types::types::{DeviceToken, Platform};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";

#[derive(Debug, Default, Deserialize)]
struct FcmErrorBody {
	#[serde(default)]
	error: FcmError,
}

#[derive(Debug, Default, Deserialize)]
struct FcmError {
	#[serde(default)]
	status: String,
	#[serde(default)]
	message: String,
	#[serde(default)]
	details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcmErrorDetail {
	#[serde(default)]
	error_code: Option<String>,
}

/// Maps an FCM response to a per-token outcome
pub fn classify_response(status: StatusCode, body: &str) -> PushOutcome {
	if status.is_success() {
		return PushOutcome::Success;
	}
	let parsed: FcmErrorBody = serde_json::from_str(body).unwrap_or_default();
	let error_code = parsed
		.error
		.details
		.iter()
		.find_map(|detail| detail.error_code.as_deref())
		.unwrap_or(parsed.error.status.as_str());
	let reason = format!("HTTP {} {}: {}", status.as_u16(), error_code, parsed.error.message);

	match (status, error_code) {
		(_, "UNREGISTERED" | "SENDER_ID_MISMATCH") | (StatusCode::NOT_FOUND, _) => {
			PushOutcome::Invalid
		}
		(_, "QUOTA_EXCEEDED" | "UNAVAILABLE" | "INTERNAL") => PushOutcome::Transient(reason),
		(StatusCode::TOO_MANY_REQUESTS, _) => PushOutcome::Transient(reason),
		(s, _) if s.is_server_error() => PushOutcome::Transient(reason),
		_ => PushOutcome::Rejected(reason),
	}
}

/// Builds the v1 `messages:send` request body for one token
fn message_body(token: &str, payload: &NotificationPayload) -> serde_json::Value {
	// FCM data values must be strings
	let mut data: serde_json::Map<String, serde_json::Value> = payload
		.data
		.iter()
		.map(|(key, value)| {
			let value = match value {
				serde_json::Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			(key.clone(), value.into())
		})
		.collect();
	if let Some(path) = &payload.path {
		data.insert("path".into(), path.clone().into());
	}

	let mut android = json!({ "priority": "high" });
	if let Some(tag) = &payload.tag {
		android["notification"] = json!({ "tag": tag });
		android["collapse_key"] = tag.clone().into();
	}

	json!({
		"message": {
			"token": token,
			"notification": { "title": payload.title, "body": payload.body },
			"data": data,
			"android": android,
		}
	})
}

pub struct FcmGateway {
	project_id: String,
	access_token: String,
	endpoint: String,
	client: HttpsClient,
}

impl std::fmt::Debug for FcmGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FcmGateway")
			.field("project_id", &self.project_id)
			.field("endpoint", &self.endpoint)
			.finish_non_exhaustive()
	}
}

impl FcmGateway {
	pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> ChResult<Self> {
		let project_id = project_id.into();
		if project_id.is_empty() {
			return Err(Error::ConfigError("FCM project id is empty".into()));
		}
		Ok(Self {
			project_id,
			access_token: access_token.into(),
			endpoint: FCM_ENDPOINT.into(),
			client: https_client(false)?,
		})
	}

	/// Overrides the API base URL
	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = endpoint.into();
		self
	}

	fn send_url(&self) -> String {
		format!("{}/v1/projects/{}/messages:send", self.endpoint.trim_end_matches('/'), self.project_id)
	}

	async fn send_one(&self, url: &str, token: &DeviceToken, payload: &NotificationPayload) -> PushOutcome {
		let body = match serde_json::to_vec(&message_body(&token.token, payload)) {
			Ok(body) => body,
			Err(e) => return PushOutcome::Rejected(format!("payload serialization error: {}", e)),
		};
		let request = match hyper::Request::builder()
			.method(hyper::Method::POST)
			.uri(url)
			.header("Content-Type", "application/json")
			.header("Authorization", format!("Bearer {}", self.access_token))
			.body(Full::new(Bytes::from(body)))
		{
			Ok(req) => req,
			Err(e) => return PushOutcome::Rejected(format!("request build error: {}", e)),
		};

		match self.client.request(request).await {
			Ok(response) => {
				let status = response.status();
				let body = body_text(response.into_body()).await;
				classify_response(status, &body)
			}
			Err(e) => PushOutcome::Transient(format!("network error: {}", e)),
		}
	}
}

#[async_trait]
impl PushGateway for FcmGateway {
	fn platform(&self) -> Platform {
		Platform::Fcm
	}

	async fn send(
		&self,
		tokens: &[DeviceToken],
		payload: &NotificationPayload,
	) -> ChResult<Vec<PushOutcome>> {
		let url = self.send_url();
		let outcomes =
			send_each(tokens, MAX_PARALLEL_REQUESTS, |token| self.send_one(&url, token, payload)).await;
		Ok(outcomes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_classify_response() {
		assert_eq!(classify_response(StatusCode::OK, "{}"), PushOutcome::Success);

		let unregistered = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
			"details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
		assert_eq!(classify_response(StatusCode::NOT_FOUND, unregistered), PushOutcome::Invalid);

		let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
		assert!(classify_response(StatusCode::TOO_MANY_REQUESTS, quota).is_transient());
		assert!(classify_response(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());

		let invalid = r#"{"error":{"code":400,"message":"Invalid JSON payload","status":"INVALID_ARGUMENT"}}"#;
		assert!(matches!(
			classify_response(StatusCode::BAD_REQUEST, invalid),
			PushOutcome::Rejected(reason) if reason.contains("INVALID_ARGUMENT")
		));
		assert!(matches!(classify_response(StatusCode::UNAUTHORIZED, ""), PushOutcome::Rejected(_)));
	}

	#[test]
	fn test_message_body_stringifies_data() {
		let mut data = serde_json::Map::new();
		data.insert("eventId".into(), "ev1".into());
		data.insert("startAt".into(), 1_700_000_000.into());
		let payload = NotificationPayload {
			title: "Standup".into(),
			body: "Standup starts in 5 minutes".into(),
			path: Some("/events/ev1".into()),
			tag: Some("r1~abc".into()),
			data,
		};

		let body = message_body("device-token", &payload);
		let message = &body["message"];
		assert_eq!(message["token"], "device-token");
		assert_eq!(message["notification"]["title"], "Standup");
		assert_eq!(message["data"]["startAt"], "1700000000");
		assert_eq!(message["data"]["path"], "/events/ev1");
		assert_eq!(message["android"]["collapse_key"], "r1~abc");
	}
}

// vim: ts=4
