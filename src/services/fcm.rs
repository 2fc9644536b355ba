//! FCM delivery through the HTTP v1 API.
//!
//! Requests go to `/v1/projects/{project_id}/messages:send` with a cached
//! OAuth2 bearer token. [`FcmChannel`] carries the transport and
//! credentials shared by the Android and Web services, which differ only
//! in how they shape the message.

use crate::adapters::credentials::fcm::FcmTokenSource;
use crate::adapters::{CachedTokenProvider, Transport};
use crate::adapters::transport::{HttpTransport, RawResponse};
use crate::config::FcmConfig;
use crate::domain::Notification;
use crate::error::{PushError, Result};
use crate::services::PushService;
use crate::services::payload::{compact_at, deep_merge, prune_empty_at, stringify};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const ORIGIN: &str = "https://fcm.googleapis.com";

pub(crate) struct FcmChannel {
    project_id: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<CachedTokenProvider>,
}

impl fmt::Debug for FcmChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmChannel").field("project_id", &self.project_id).finish_non_exhaustive()
    }
}

impl FcmChannel {
    pub(crate) fn new(config: &FcmConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            ORIGIN,
            Duration::from_secs(config.request_timeout_secs),
            config.pool_size,
        )?;
        let credentials = CachedTokenProvider::new(FcmTokenSource::new(config)?);
        Ok(Self::with_parts(
            config.service_account.project_id.clone(),
            Arc::new(transport),
            Arc::new(credentials),
        ))
    }

    pub(crate) fn with_parts(
        project_id: String,
        transport: Arc<dyn Transport>,
        credentials: Arc<CachedTokenProvider>,
    ) -> Self {
        Self { project_id, transport, credentials }
    }

    pub(crate) async fn send(&self, payload: &Value) -> Result<()> {
        let bearer = self.credentials.fresh_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|e| PushError::Config(format!("invalid bearer token: {e}")))?,
        );

        let path = format!("/v1/projects/{}/messages:send", self.project_id);
        let response = self.transport.post(&path, payload, headers).await?;
        handle_response(&response)
    }
}

pub struct FcmService {
    channel: FcmChannel,
}

impl fmt::Debug for FcmService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmService").field("channel", &self.channel).finish()
    }
}

impl FcmService {
    pub fn new(config: &FcmConfig) -> Result<Self> {
        Ok(Self { channel: FcmChannel::new(config)? })
    }

    pub fn with_parts(
        project_id: String,
        transport: Arc<dyn Transport>,
        credentials: Arc<CachedTokenProvider>,
    ) -> Self {
        Self { channel: FcmChannel::with_parts(project_id, transport, credentials) }
    }
}

#[async_trait]
impl PushService for FcmService {
    #[tracing::instrument(skip_all)]
    async fn push(&self, notification: &Notification) -> Result<()> {
        let token = notification
            .token()
            .ok_or_else(|| PushError::Config("notification has no device token".to_owned()))?;

        tracing::info!("Pushing FCM notification");
        self.channel.send(&payload_from(notification, token)).await
    }
}

fn handle_response(response: &RawResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let reason = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| {
            body.get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| response.body.clone());
    let error = classify(response.status, &reason);
    tracing::error!(status = response.status, reason = %reason, "FCM response error");
    Err(error)
}

fn classify(status: u16, reason: &str) -> PushError {
    // Size overruns come back as 400, so the message check runs first.
    if reason.to_lowercase().contains("message is too big") {
        return PushError::PayloadTooLarge(reason.to_owned());
    }
    let reason = reason.to_owned();
    match status {
        400 => PushError::BadRequest(reason),
        404 => PushError::TokenInvalid(reason),
        401 | 403 => PushError::Forbidden(reason),
        429 => PushError::RateLimited(reason),
        503 => PushError::ServiceUnavailable(reason),
        _ => PushError::InternalServer(reason),
    }
}

/// Builds the Android message body. Custom data values are coerced to
/// strings as the v1 API requires, and the `google_payload` override is
/// deep-merged on top with its own `data` branch stringified as well.
fn payload_from(notification: &Notification, token: &str) -> Value {
    let priority = if notification.high_priority { "high" } else { "normal" };
    let mut payload = json!({
        "message": {
            "token": token,
            "data": stringify(&notification.data),
            "android": {
                "notification": {
                    "title": notification.title,
                    "body": notification.body,
                    "notification_count": notification.badge,
                    "sound": notification.sound,
                },
                "collapse_key": notification.thread_id,
                "priority": priority,
            }
        }
    });

    let mut overlay = notification.google_payload.clone();
    if let Some(Value::Object(data)) = overlay.remove("data") {
        overlay.insert("data".to_owned(), Value::Object(stringify(&data)));
    }
    deep_merge(&mut payload, &json!({ "message": overlay }));

    compact_at(&mut payload, &["message", "android", "notification"]);
    compact_at(&mut payload, &["message", "android"]);
    prune_empty_at(&mut payload, &["message", "android", "notification"]);
    compact_at(&mut payload, &["message"]);
    payload
}
