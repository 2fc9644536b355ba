use thiserror::Error;

/// Closed set of delivery error kinds. Classification of provider
/// responses is total: every response or transport outcome maps to
/// exactly one of these kinds or to success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("device token rejected by provider: {0}")]
    TokenInvalid(String),
    #[error("device token does not belong to topic: {0}")]
    BadTopic(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("provider internal error: {0}")]
    InternalServer(String),
    #[error("invalid push configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PushError>;

impl PushError {
    /// True for errors that mean the provider has permanently rejected
    /// the device token. These trigger device deactivation and are never
    /// propagated past the delivery coordinator.
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(self, Self::TokenInvalid(_) | Self::BadTopic(_))
    }

    /// Stable label for the error kind, used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::TokenInvalid(_) => "token_invalid",
            Self::BadTopic(_) => "bad_topic",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::RateLimited(_) => "rate_limited",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::InternalServer(_) => "internal_server",
            Self::Config(_) => "config",
        }
    }
}
