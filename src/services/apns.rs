//! APNs delivery over the HTTP/2 provider API.
//!
//! Requests are authenticated with a cached ES256 provider token and sent
//! to `/3/device/{token}`. The `apple_payload` override merges into the
//! generated `aps` tree, except for the reserved `apns-*` keys which turn
//! into request headers instead.

use crate::adapters::credentials::apns::ApnsTokenSource;
use crate::adapters::{CachedTokenProvider, Transport};
use crate::adapters::transport::{HttpTransport, RawResponse};
use crate::config::ApnsConfig;
use crate::domain::Notification;
use crate::error::{PushError, Result};
use crate::services::PushService;
use crate::services::payload::{compact_at, compact_blank_at, deep_merge};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const PRODUCTION_ORIGIN: &str = "https://api.push.apple.com";
const SANDBOX_ORIGIN: &str = "https://api.sandbox.push.apple.com";

/// Keys in `apple_payload` that configure the request rather than the
/// notification body.
const HEADER_KEYS: [&str; 6] = [
    "apns-id",
    "apns-push-type",
    "apns-priority",
    "apns-topic",
    "apns-expiration",
    "apns-collapse-id",
];

pub struct ApnsService {
    topic: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<CachedTokenProvider>,
}

impl fmt::Debug for ApnsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApnsService").field("topic", &self.topic).finish_non_exhaustive()
    }
}

impl ApnsService {
    pub fn new(config: &ApnsConfig) -> Result<Self> {
        let origin = if config.sandbox { SANDBOX_ORIGIN } else { PRODUCTION_ORIGIN };
        let transport = HttpTransport::new(
            origin,
            Duration::from_secs(config.request_timeout_secs),
            config.pool_size,
        )?;
        let credentials = CachedTokenProvider::new(ApnsTokenSource::new(config)?);
        Ok(Self::with_parts(config.topic.clone(), Arc::new(transport), Arc::new(credentials)))
    }

    pub fn with_parts(
        topic: String,
        transport: Arc<dyn Transport>,
        credentials: Arc<CachedTokenProvider>,
    ) -> Self {
        Self { topic, transport, credentials }
    }
}

#[async_trait]
impl PushService for ApnsService {
    #[tracing::instrument(skip_all)]
    async fn push(&self, notification: &Notification) -> Result<()> {
        let token = notification
            .token()
            .ok_or_else(|| PushError::Config("notification has no device token".to_owned()))?;

        let headers = headers_from(notification, &self.topic);
        let apns_id = headers.get("apns-id").cloned().unwrap_or_default();
        let payload = payload_from(notification);

        let mut header_map = to_header_map(&headers);
        let bearer = self.credentials.fresh_token().await?;
        header_map.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|e| PushError::Config(format!("invalid bearer token: {e}")))?,
        );

        tracing::info!(apns_id = %apns_id, "Pushing APNs notification");
        let response =
            self.transport.post(&format!("/3/device/{token}"), &payload, header_map).await?;
        handle_response(&response)
    }
}

fn handle_response(response: &RawResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let reason = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| body.get("reason").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| response.body.clone());
    let error = classify(response.status, &reason);
    tracing::error!(status = response.status, reason = %reason, "APNs response error");
    Err(error)
}

fn classify(status: u16, reason: &str) -> PushError {
    let reason = reason.to_owned();
    match status {
        400 if reason == "BadDeviceToken" => PushError::TokenInvalid(reason),
        400 if reason == "DeviceTokenNotForTopic" => PushError::BadTopic(reason),
        400 => PushError::BadRequest(reason),
        403 => PushError::Forbidden(reason),
        404 => PushError::NotFound(reason),
        410 => PushError::TokenInvalid(reason),
        413 => PushError::PayloadTooLarge(reason),
        429 => PushError::RateLimited(reason),
        503 => PushError::ServiceUnavailable(reason),
        _ => PushError::InternalServer(reason),
    }
}

/// Builds the request headers. The generated values come first, then the
/// `apns-*` keys of `apple_payload` override them; a null override removes
/// the header.
fn headers_from(notification: &Notification, topic: &str) -> BTreeMap<String, String> {
    let background = notification
        .apple_payload
        .get("aps")
        .and_then(|aps| aps.get("content-available"))
        .and_then(Value::as_i64)
        == Some(1);
    let push_type = if background { "background" } else { "alert" };
    let priority = if notification.high_priority { "10" } else { "5" };

    let mut headers = BTreeMap::from([
        ("apns-push-type".to_owned(), push_type.to_owned()),
        ("apns-id".to_owned(), Uuid::new_v4().to_string()),
        ("apns-priority".to_owned(), priority.to_owned()),
        ("apns-topic".to_owned(), topic.to_owned()),
    ]);

    for key in HEADER_KEYS {
        match notification.apple_payload.get(key) {
            Some(Value::Null) => {
                headers.remove(key);
            }
            Some(value) => {
                if let Some(text) = header_text(value) {
                    headers.insert(key.to_owned(), text);
                }
            }
            None => {}
        }
    }
    headers
}

fn header_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    headers
        .iter()
        .filter_map(|(key, value)| {
            let name = HeaderName::from_bytes(key.as_bytes()).ok()?;
            let value = HeaderValue::from_str(value).ok()?;
            Some((name, value))
        })
        .collect()
}

/// Builds the request body: the generated `aps` tree, custom `data` keys
/// at the top level, then the `apple_payload` override deep-merged on
/// top. Null entries prune the generated defaults.
fn payload_from(notification: &Notification) -> Value {
    let mut payload = json!({
        "aps": {
            "alert": {
                "title": notification.title,
                "body": notification.body,
            },
            "badge": notification.badge,
            "thread-id": notification.thread_id,
            "sound": notification.sound,
        }
    });

    if let Value::Object(map) = &mut payload {
        for (key, value) in &notification.data {
            map.insert(key.clone(), value.clone());
        }
    }

    let mut overlay = notification.apple_payload.clone();
    for key in HEADER_KEYS {
        overlay.remove(key);
    }
    deep_merge(&mut payload, &Value::Object(overlay));

    compact_at(&mut payload, &["aps", "alert"]);
    compact_blank_at(&mut payload, &["aps"]);
    if let Value::Object(map) = &mut payload {
        map.retain(|_, v| !v.is_null());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PayloadMap;
    use serde_json::json;

    fn base() -> Notification {
        Notification::new().title("Hi").body("there")
    }

    fn obj(value: Value) -> PayloadMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn payload_nests_alert_under_aps() {
        let payload = payload_from(&base().badge(3).sound("chime"));

        assert_eq!(payload["aps"]["alert"], json!({ "title": "Hi", "body": "there" }));
        assert_eq!(payload["aps"]["badge"], json!(3));
        assert_eq!(payload["aps"]["sound"], json!("chime"));
        assert!(payload["aps"].get("thread-id").is_none());
    }

    #[test]
    fn data_lands_at_the_top_level() {
        let payload = payload_from(&base().with_data(obj(json!({ "conversation_id": 7 }))));

        assert_eq!(payload["conversation_id"], json!(7));
        assert!(payload["aps"].get("conversation_id").is_none());
    }

    #[test]
    fn apple_override_merges_into_aps() {
        let notification = base()
            .sound("default")
            .with_apple(obj(json!({ "aps": { "sound": null, "category": "MESSAGE" } })));
        let payload = payload_from(&notification);

        assert!(payload["aps"].get("sound").is_none());
        assert_eq!(payload["aps"]["category"], json!("MESSAGE"));
        assert_eq!(payload["aps"]["alert"]["title"], json!("Hi"));
    }

    #[test]
    fn header_keys_never_reach_the_body() {
        let notification =
            base().with_apple(obj(json!({ "apns-collapse-id": "c1", "apns-priority": 5 })));
        let payload = payload_from(&notification);

        assert!(payload.get("apns-collapse-id").is_none());
        assert!(payload.get("apns-priority").is_none());
    }

    #[test]
    fn silent_notification_has_no_alert() {
        let payload = payload_from(&Notification::new().silent());

        assert!(payload["aps"].get("alert").is_none());
        assert_eq!(payload["aps"]["content-available"], json!(1));
    }

    #[test]
    fn generated_headers_for_a_visible_notification() {
        let headers = headers_from(&base(), "com.example.app");

        assert_eq!(headers["apns-push-type"], "alert");
        assert_eq!(headers["apns-priority"], "10");
        assert_eq!(headers["apns-topic"], "com.example.app");
        assert_eq!(headers["apns-id"].len(), 36);
    }

    #[test]
    fn background_push_type_follows_content_available() {
        let notification = base().silent();
        let headers = headers_from(&notification, "com.example.app");

        assert_eq!(headers["apns-push-type"], "background");
        assert_eq!(headers["apns-priority"], "5");
    }

    #[test]
    fn override_headers_win_and_nulls_remove() {
        let notification = base()
            .with_apple(obj(json!({ "apns-id": "fixed", "apns-expiration": 0, "apns-topic": null })));
        let headers = headers_from(&notification, "com.example.app");

        assert_eq!(headers["apns-id"], "fixed");
        assert_eq!(headers["apns-expiration"], "0");
        assert!(!headers.contains_key("apns-topic"));
    }

    #[test]
    fn classifier_splits_bad_request_by_reason() {
        assert_eq!(
            classify(400, "BadDeviceToken"),
            PushError::TokenInvalid("BadDeviceToken".to_owned())
        );
        assert_eq!(
            classify(400, "DeviceTokenNotForTopic"),
            PushError::BadTopic("DeviceTokenNotForTopic".to_owned())
        );
        assert_eq!(classify(400, "BadMessageId"), PushError::BadRequest("BadMessageId".to_owned()));
        assert_eq!(
            classify(403, "ExpiredProviderToken"),
            PushError::Forbidden("ExpiredProviderToken".to_owned())
        );
        assert_eq!(classify(404, "BadPath"), PushError::NotFound("BadPath".to_owned()));
        assert_eq!(classify(410, "Unregistered"), PushError::TokenInvalid("Unregistered".to_owned()));
        assert_eq!(
            classify(413, "PayloadTooLarge"),
            PushError::PayloadTooLarge("PayloadTooLarge".to_owned())
        );
        assert_eq!(classify(429, "TooManyRequests"), PushError::RateLimited("TooManyRequests".to_owned()));
        assert_eq!(
            classify(503, "ServiceUnavailable"),
            PushError::ServiceUnavailable("ServiceUnavailable".to_owned())
        );
        assert_eq!(classify(500, "InternalServerError"), PushError::InternalServer("InternalServerError".to_owned()));
    }
}
