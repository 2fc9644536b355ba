use super::{FreshToken, TokenSource};
use crate::config::FcmConfig;
use crate::error::{PushError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Regenerate slightly before the provider-reported expiry.
const REFRESH_BUFFER_SECS: u64 = 60;

/// Assertion lifetime requested from the token endpoint.
const ASSERTION_TTL_SECS: i64 = 3600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'static str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges a Google service-account assertion for an OAuth2 bearer
/// token via the standard JWT-bearer grant.
pub struct FcmTokenSource {
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    http: reqwest::Client,
}

impl fmt::Debug for FcmTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmTokenSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl FcmTokenSource {
    /// # Errors
    /// Returns a configuration error if the service-account private key
    /// is not a valid RSA PEM or the HTTP client cannot be built.
    pub fn new(config: &FcmConfig) -> Result<Self> {
        let key = &config.service_account;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| PushError::Config(format!("invalid service account key: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PushError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
            signing_key,
            http,
        })
    }

    fn assertion(&self) -> Result<String> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            exp: now + ASSERTION_TTL_SECS,
            iat: now,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| PushError::Config(format!("failed to sign service account assertion: {e}")))
    }
}

const fn ttl_from_expires_in(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(REFRESH_BUFFER_SECS))
}

#[async_trait]
impl TokenSource for FcmTokenSource {
    async fn issue(&self) -> Result<FreshToken> {
        let assertion = self.assertion()?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PushError::Timeout(format!("OAuth2 token exchange timed out: {e}"))
                } else {
                    PushError::Connection(format!("OAuth2 token exchange failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::InternalServer(format!(
                "OAuth2 token exchange returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            PushError::InternalServer(format!("malformed OAuth2 token response: {e}"))
        })?;

        Ok(FreshToken {
            value: token.access_token,
            ttl: ttl_from_expires_in(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceAccountKey;

    #[test]
    fn cache_window_keeps_a_safety_buffer() {
        assert_eq!(ttl_from_expires_in(3600), Duration::from_secs(3540));
        // Degenerate short-lived tokens never underflow.
        assert_eq!(ttl_from_expires_in(30), Duration::ZERO);
    }

    #[test]
    fn rejects_malformed_service_account_keys_at_construction() {
        let config = FcmConfig::new(ServiceAccountKey {
            project_id: "demo".into(),
            private_key_id: "kid".into(),
            private_key: "not a pem".into(),
            client_email: "svc@demo.iam.gserviceaccount.com".into(),
            token_uri: "https://oauth2.googleapis.com/token".into(),
        });

        let err = FcmTokenSource::new(&config).unwrap_err();
        assert!(matches!(err, PushError::Config(_)));
    }
}
