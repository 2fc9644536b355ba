use crate::domain::device::Platform;
use crate::error::{PushError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default request timeout for APNs deliveries.
pub const DEFAULT_APNS_TIMEOUT_SECS: u64 = 30;

/// FCM suggests at least a 10s timeout for requests, we set 15 to add some buffer.
/// https://firebase.google.com/docs/cloud-messaging/scale-fcm#timeouts
pub const DEFAULT_FCM_TIMEOUT_SECS: u64 = 15;

/// Default connection pool size per provider configuration.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Credentials and tunables for one APNs application.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApnsConfig {
    /// Apple developer team identifier, the `iss` claim of the provider token
    pub team_id: String,

    /// Identifier of the signing key, sent as the `kid` JWT header
    pub key_id: String,

    /// PEM-encoded EC (P-256) private key used to sign provider tokens
    pub private_key: String,

    /// Default `apns-topic`, usually the app bundle identifier
    pub topic: String,

    /// Deliver through the sandbox environment instead of production
    pub sandbox: bool,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum pooled connections for this configuration
    pub pool_size: usize,
}

impl ApnsConfig {
    pub fn new(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            private_key: private_key.into(),
            topic: topic.into(),
            sandbox: false,
            request_timeout_secs: DEFAULT_APNS_TIMEOUT_SECS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    #[must_use]
    pub const fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Google service account key, as downloaded from the Firebase console.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Parses a service account key from its JSON representation.
    ///
    /// # Errors
    /// Returns a configuration error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PushError::Config(format!("invalid service account key: {e}")))
    }
}

/// Credentials and tunables for one FCM application (Android or Web Push).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FcmConfig {
    /// Service account used for the OAuth2 token exchange
    pub service_account: ServiceAccountKey,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum pooled connections for this configuration
    pub pool_size: usize,
}

impl FcmConfig {
    #[must_use]
    pub const fn new(service_account: ServiceAccountKey) -> Self {
        Self {
            service_account,
            request_timeout_secs: DEFAULT_FCM_TIMEOUT_SECS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Provider selection for one `(platform, application)` pair. Value
/// equality decides sharing: identical configurations share one transport
/// pool and one credential cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProviderConfig {
    Apns(ApnsConfig),
    Fcm(FcmConfig),
    FcmWeb(FcmConfig),
}

/// The configuration surface consumed by the delivery pipeline: a global
/// enabled flag and the `(platform, application)` to provider mapping.
/// Loading this from files or the environment is the host's concern.
#[derive(Clone, Debug)]
pub struct PushConfig {
    /// Globally disables delivery when false; `deliver` becomes a no-op
    pub enabled: bool,

    providers: HashMap<(Platform, String), ProviderConfig>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PushConfig {
    #[must_use]
    pub fn new() -> Self {
        Self { enabled: true, providers: HashMap::new() }
    }

    #[must_use]
    pub fn with_provider(
        mut self,
        platform: Platform,
        application: impl Into<String>,
        config: ProviderConfig,
    ) -> Self {
        self.providers.insert((platform, application.into()), config);
        self
    }

    /// Resolves the provider configuration for a platform/application
    /// pair. The lookup is deterministic: the same pair always yields the
    /// same configuration.
    ///
    /// # Errors
    /// Returns a configuration error if the pair is not configured.
    pub fn provider_for(&self, platform: Platform, application: &str) -> Result<&ProviderConfig> {
        self.providers.get(&(platform, application.to_string())).ok_or_else(|| {
            PushError::Config(format!("'{platform}' platform is not configured for application '{application}'"))
        })
    }
}
