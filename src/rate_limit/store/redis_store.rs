use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use tracing::info;

use super::{RateLimitEntry, RateLimitStore, StoreError};

const KEY_PREFIX: &str = "rate_limit";

// Count, arm the window on the first hit, report what is left of it. A key
// that somehow lost its TTL is re-armed instead of living forever.
const HIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Counters shared by every gateway instance pointed at the same Redis.
/// Window expiry is Redis key expiry, so there is nothing to sweep.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    hit_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Rate limit store connected to Redis");

        Ok(Self {
            conn,
            hit_script: Script::new(HIT_SCRIPT),
        })
    }

    fn redis_key(key: &str) -> String {
        format!("{}:{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn hit(
        &self,
        key: &str,
        window_ms: u64,
        now_ms: i64,
    ) -> Result<RateLimitEntry, StoreError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (u64, i64) = self
            .hit_script
            .key(Self::redis_key(key))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(RateLimitEntry {
            count,
            window_reset_at: now_ms + ttl_ms,
        })
    }

    async fn sweep(&self, _now_ms: i64) -> Result<usize, StoreError> {
        Ok(0)
    }
}
