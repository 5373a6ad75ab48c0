use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RateLimitingConfig, StoreKind};

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Request counter for one client under one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u64,
    /// Epoch milliseconds at which the window closes.
    pub window_reset_at: i64,
}

impl RateLimitEntry {
    pub fn fresh(now_ms: i64, window_ms: u64) -> Self {
        Self {
            count: 0,
            window_reset_at: now_ms.saturating_add(window_ms as i64),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.window_reset_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Counter storage behind the rate limiter.
///
/// `hit` must be atomic per key: two concurrent hits on the same key never
/// observe the same count.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Gets the entry for `key`, replacing it with a fresh window when it is
    /// absent or expired, then counts one request against it.
    async fn hit(&self, key: &str, window_ms: u64, now_ms: i64)
        -> Result<RateLimitEntry, StoreError>;

    /// Drops expired entries and returns how many were removed.
    async fn sweep(&self, now_ms: i64) -> Result<usize, StoreError>;
}

pub async fn build_store(config: &RateLimitingConfig) -> Result<Arc<dyn RateLimitStore>, StoreError> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::Redis => Ok(Arc::new(RedisStore::connect(&config.redis_url).await?)),
    }
}
