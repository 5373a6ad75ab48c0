use async_trait::async_trait;
use dashmap::DashMap;

use super::{RateLimitEntry, RateLimitStore, StoreError};

/// Process-local counters. Lost on restart and not shared between
/// instances; use the Redis store when running more than one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored entry for `key`, expired or not, until a hit or sweep replaces it.
    pub fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|entry| *entry)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(
        &self,
        key: &str,
        window_ms: u64,
        now_ms: i64,
    ) -> Result<RateLimitEntry, StoreError> {
        // The shard lock is held until `entry` drops.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::fresh(now_ms, window_ms));

        if entry.is_expired(now_ms) {
            *entry = RateLimitEntry::fresh(now_ms, window_ms);
        }
        entry.count += 1;

        Ok(*entry)
    }

    async fn sweep(&self, now_ms: i64) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now_ms);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
