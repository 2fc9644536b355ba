use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Provider override tree or custom data payload.
pub type PayloadMap = Map<String, Value>;

/// A push notification that can be delivered to devices.
///
/// Immutable once handed to the pipeline; every builder method returns a
/// new value, so a notification can safely serve as a template for
/// variants (`silent`, per-provider overrides). The device token is set
/// by the delivery coordinator immediately before delivery and is never
/// part of the serialized representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Badge number to display on the app icon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,

    /// Provider-level grouping key (APNs thread id, FCM collapse key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,

    /// High priority delivery (default). Recommended off for silent
    /// notifications.
    #[serde(default = "default_high_priority")]
    pub high_priority: bool,

    /// APNs-specific overrides, deep-merged over the generated payload
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub apple_payload: PayloadMap,

    /// FCM (Android) overrides, deep-merged over the generated message
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub google_payload: PayloadMap,

    /// FCM (Web Push) overrides, deep-merged over the generated message
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub web_payload: PayloadMap,

    /// Custom key/value payload delivered to the client application
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: PayloadMap,

    /// Free-form metadata for delivery hooks, never sent to providers
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: PayloadMap,

    /// Delivery address, populated from the target device at delivery
    /// time only. Never serialized.
    #[serde(skip)]
    token: Option<String>,
}

const fn default_high_priority() -> bool {
    true
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}

impl Notification {
    #[must_use]
    pub fn new() -> Self {
        Self {
            title: None,
            body: None,
            badge: None,
            thread_id: None,
            sound: None,
            high_priority: true,
            apple_payload: PayloadMap::new(),
            google_payload: PayloadMap::new(),
            web_payload: PayloadMap::new(),
            data: PayloadMap::new(),
            context: PayloadMap::new(),
            token: None,
        }
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub const fn badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    #[must_use]
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    #[must_use]
    pub const fn high_priority(mut self, high_priority: bool) -> Self {
        self.high_priority = high_priority;
        self
    }

    /// Merges custom data into the notification. Later calls win on key
    /// conflicts.
    #[must_use]
    pub fn with_data(mut self, data: PayloadMap) -> Self {
        self.data.extend(data);
        self
    }

    /// Merges APNs-specific payload overrides. Later calls win on key
    /// conflicts.
    #[must_use]
    pub fn with_apple(mut self, payload: PayloadMap) -> Self {
        self.apple_payload.extend(payload);
        self
    }

    /// Merges FCM (Android) payload overrides.
    #[must_use]
    pub fn with_google(mut self, payload: PayloadMap) -> Self {
        self.google_payload.extend(payload);
        self
    }

    /// Merges FCM (Web Push) payload overrides.
    #[must_use]
    pub fn with_web(mut self, payload: PayloadMap) -> Self {
        self.web_payload.extend(payload);
        self
    }

    /// A silent variant: no visible alert, low priority, wakes the app in
    /// the background via `content-available`.
    #[must_use]
    pub fn silent(self) -> Self {
        let aps = match json!({ "aps": { "content-available": 1 } }) {
            Value::Object(map) => map,
            _ => PayloadMap::new(),
        };
        self.high_priority(false).with_apple(aps)
    }

    /// Stores free-form metadata for delivery hooks.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Returns a delivery copy addressed to the given device token.
    #[must_use]
    pub fn for_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The delivery address, present only on delivery copies.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
