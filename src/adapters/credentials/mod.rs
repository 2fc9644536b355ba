use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub mod apns;
pub mod fcm;

pub use apns::ApnsTokenSource;
pub use fcm::FcmTokenSource;

/// A freshly issued bearer credential and its validity window.
#[derive(Debug, Clone)]
pub struct FreshToken {
    pub value: String,
    pub ttl: Duration,
}

/// Issues a short-lived bearer credential: a signed JWT for APNs, an
/// OAuth2 access token for FCM.
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    async fn issue(&self) -> Result<FreshToken>;
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Caches credentials from a [`TokenSource`], regenerating lazily on the
/// first use after expiry, never proactively. The mutex is held across
/// regeneration, so concurrent callers against the same provider
/// configuration can never trigger overlapping exchanges.
#[derive(Debug)]
pub struct CachedTokenProvider {
    source: Box<dyn TokenSource>,
    cached: Mutex<Option<CachedToken>>,
}

impl CachedTokenProvider {
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self { source: Box::new(source), cached: Mutex::new(None) }
    }

    /// Returns a credential valid at the time of the call.
    ///
    /// # Errors
    /// Propagates the source's issue failure.
    pub async fn fresh_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.source.issue().await?;
        let expires_at = Instant::now() + fresh.ttl;
        *cached = Some(CachedToken { value: fresh.value.clone(), expires_at });

        Ok(fresh.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingSource {
        issued: Arc<AtomicUsize>,
        ttl: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue(&self) -> Result<FreshToken> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(FreshToken { value: format!("token-{n}"), ttl: self.ttl })
        }
    }

    #[tokio::test]
    async fn consecutive_calls_within_the_window_share_one_exchange() {
        let issued = Arc::new(AtomicUsize::new(0));
        let provider = CachedTokenProvider::new(CountingSource {
            issued: Arc::clone(&issued),
            ttl: Duration::from_secs(3600),
        });

        let first = provider.fresh_token().await.unwrap();
        let second = provider.fresh_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_triggers_exactly_one_regeneration() {
        let issued = Arc::new(AtomicUsize::new(0));
        // Zero TTL: every call is past expiry.
        let provider = CachedTokenProvider::new(CountingSource {
            issued: Arc::clone(&issued),
            ttl: Duration::ZERO,
        });

        let first = provider.fresh_token().await.unwrap();
        let second = provider.fresh_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_never_overlap_exchanges() {
        let issued = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(CachedTokenProvider::new(CountingSource {
            issued: Arc::clone(&issued),
            ttl: Duration::from_secs(3600),
        }));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.fresh_token().await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }
}
