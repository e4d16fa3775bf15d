//! Fixed-window rate limiter backed by the fast cache.
//!
//! Every request is counted under a per-address key and, when an
//! identity is submitted, under a per-identity key as well (one account
//! hammered from many addresses still trips the limit). Any key over
//! the maximum rejects the whole request. A cache failure lets the
//! request through: availability over strictness.

use std::sync::Arc;

use crate::services::cache::Cache;
use crate::services::error::ServiceError;

#[derive(Clone)]
pub struct FixedWindowLimiter {
    cache: Arc<dyn Cache>,
    prefix: String,
    window_seconds: i64,
    max_requests: i64,
}

impl FixedWindowLimiter {
    pub fn new(
        cache: Arc<dyn Cache>,
        prefix: impl Into<String>,
        window_seconds: i64,
        max_requests: i64,
    ) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            window_seconds,
            max_requests,
        }
    }

    /// Count this request against every relevant key; reject with a
    /// retry-after hint once any counter exceeds the maximum.
    pub async fn check(
        &self,
        client_addr: &str,
        identity: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut keys = vec![format!("{}:ip:{}", self.prefix, client_addr)];

        if let Some(identity) = identity {
            let normalized = identity.trim().to_lowercase();
            if !normalized.is_empty() {
                keys.push(format!("{}:user:{}", self.prefix, normalized));
            }
        }

        for key in keys {
            let count = match self.cache.incr(&key).await {
                Ok(n) => n,
                Err(e) => {
                    // Fail open: never block traffic on a cache outage
                    tracing::warn!(key = %key, error = %e, "Rate limit counter unavailable, allowing request");
                    return Ok(());
                }
            };

            if count == 1 {
                if let Err(e) = self.cache.expire(&key, self.window_seconds).await {
                    tracing::warn!(key = %key, error = %e, "Failed to set rate limit window expiry");
                }
            }

            if count > self.max_requests {
                tracing::warn!(key = %key, count, "Rate limit exceeded");
                return Err(ServiceError::RateLimited {
                    retry_after_seconds: self.window_seconds as u64,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{MockCache, UnreachableCache};

    fn limiter(cache: Arc<dyn Cache>, max: i64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(cache, "login", 900, max)
    }

    #[tokio::test]
    async fn test_allows_up_to_max_then_rejects() {
        let limiter = limiter(Arc::new(MockCache::new()), 3);

        for _ in 0..3 {
            limiter.check("10.0.0.1", None).await.unwrap();
        }

        let err = limiter.check("10.0.0.1", None).await.unwrap_err();
        match err {
            ServiceError::RateLimited {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 900),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(Arc::new(MockCache::new()), 1);

        limiter.check("10.0.0.1", None).await.unwrap();
        // Different address has its own window
        limiter.check("10.0.0.2", None).await.unwrap();
        assert!(limiter.check("10.0.0.1", None).await.is_err());
    }

    #[tokio::test]
    async fn test_identity_key_trips_across_addresses() {
        let limiter = limiter(Arc::new(MockCache::new()), 2);

        limiter.check("10.0.0.1", Some("alice")).await.unwrap();
        limiter.check("10.0.0.2", Some("Alice ")).await.unwrap();
        // Third attempt at the same normalized identity is rejected
        // even from a fresh address.
        assert!(limiter.check("10.0.0.3", Some("ALICE")).await.is_err());
    }

    #[tokio::test]
    async fn test_window_elapse_resets_counter() {
        let cache = Arc::new(MockCache::new());
        let limiter = limiter(cache.clone(), 1);

        limiter.check("10.0.0.1", None).await.unwrap();
        assert!(limiter.check("10.0.0.1", None).await.is_err());

        cache.force_expire("login:ip:10.0.0.1");
        limiter.check("10.0.0.1", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_fails_open_on_cache_outage() {
        let limiter = limiter(Arc::new(UnreachableCache), 1);

        for _ in 0..10 {
            limiter.check("10.0.0.1", Some("alice")).await.unwrap();
        }
    }
}
