//! Fast-cache seam: Redis in production, in-memory mock in tests.
//!
//! The trait covers exactly the primitives the core needs: single-key
//! get/set with optional TTL, atomic increment, expiry, delete. No
//! cross-key ordering is assumed beyond per-key atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error>;
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error>;
    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn del(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisCache {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager handles reconnection transparently
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("GET {} failed: {}", key, e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("SET {} failed: {}", key, e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("SET EX {} failed: {}", key, e))
    }

    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("INCR {} failed: {}", key, e))
    }

    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("EXPIRE {} failed: {}", key, e))
    }

    async fn del(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("DEL {} failed: {}", key, e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory cache for tests. Honors per-key expiry so TTL-dependent
/// behavior (window resets, self-expiring session mirrors) is testable.
#[derive(Default)]
pub struct MockCache {
    entries: Mutex<HashMap<String, (String, Option<DateTime<Utc>>)>>,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force-expire a key, simulating TTL elapse.
    pub fn force_expire(&self, key: &str) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.1 = Some(Utc::now() - Duration::seconds(1));
        }
    }

    fn live_value(
        entries: &mut HashMap<String, (String, Option<DateTime<Utc>>)>,
        key: &str,
    ) -> Option<String> {
        match entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= Utc::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl Cache for MockCache {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let deadline = Utc::now() + Duration::seconds(ttl_seconds);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Some(deadline)));
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, anyhow::Error> {
        let mut entries = self.entries.lock().unwrap();
        let current = Self::live_value(&mut entries, key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        let deadline = entries.get(key).and_then(|(_, d)| *d);
        entries.insert(key.to_string(), (next.to_string(), deadline));
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.1 = Some(Utc::now() + Duration::seconds(ttl_seconds));
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Cache double whose every operation fails, for exercising the
/// degraded paths (fail-open rate limiting, store fallback).
#[derive(Default)]
pub struct UnreachableCache;

#[async_trait]
impl Cache for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn set_ex(
        &self,
        _key: &str,
        _value: &str,
        _ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn incr(&self, _key: &str) -> Result<i64, anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn expire(&self, _key: &str, _ttl_seconds: i64) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn del(&self, _key: &str) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("cache unreachable"))
    }
}
