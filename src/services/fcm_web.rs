//! Web push delivery through FCM. Shares the transport, credentials and
//! response handling with [`super::fcm`] but shapes the message with a
//! `webpush` block instead of an `android` one.

use crate::adapters::{CachedTokenProvider, Transport};
use crate::config::FcmConfig;
use crate::domain::Notification;
use crate::error::{PushError, Result};
use crate::services::PushService;
use crate::services::fcm::FcmChannel;
use crate::services::payload::{compact_at, deep_merge, prune_empty_at, stringify};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

pub struct FcmWebService {
    channel: FcmChannel,
}

impl fmt::Debug for FcmWebService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmWebService").field("channel", &self.channel).finish()
    }
}

impl FcmWebService {
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
impl PushService for FcmWebService {
    #[tracing::instrument(skip_all)]
    async fn push(&self, notification: &Notification) -> Result<()> {
        let token = notification
            .token()
            .ok_or_else(|| PushError::Config("notification has no device token".to_owned()))?;

        tracing::info!("Pushing FCM web notification");
        self.channel.send(&payload_from(notification, token)).await
    }
}

/// Builds the web message body. The `thread_id` becomes the browser
/// notification `tag`, priority maps to the `Urgency` header, and an
/// empty `data` map is pruned away entirely.
fn payload_from(notification: &Notification, token: &str) -> Value {
    let urgency = if notification.high_priority { "high" } else { "normal" };
    let mut payload = json!({
        "message": {
            "token": token,
            "data": stringify(&notification.data),
            "webpush": {
                "notification": {
                    "title": notification.title,
                    "body": notification.body,
                    "tag": notification.thread_id,
                },
                "headers": {
                    "Urgency": urgency,
                }
            }
        }
    });

    let mut overlay = notification.web_payload.clone();
    for branch in [&["data"][..], &["webpush", "data"][..]] {
        stringify_branch(&mut overlay, branch);
    }
    deep_merge(&mut payload, &json!({ "message": overlay }));

    compact_at(&mut payload, &["message", "webpush", "notification"]);
    compact_at(&mut payload, &["message", "webpush", "headers"]);
    prune_empty_at(&mut payload, &["message", "webpush", "notification"]);
    prune_empty_at(&mut payload, &["message", "webpush", "headers"]);
    compact_at(&mut payload, &["message", "webpush"]);
    prune_empty_at(&mut payload, &["message", "data"]);
    compact_at(&mut payload, &["message"]);
    payload
}

fn stringify_branch(overlay: &mut crate::domain::PayloadMap, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Some(slot) = overlay.get_mut(*first) else {
        return;
    };
    let target = rest.iter().try_fold(slot, |value, key| value.get_mut(key));
    if let Some(target) = target
        && let Value::Object(map) = &*target
    {
        *target = Value::Object(stringify(map));
    }
}
