use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info};

use super::{now_millis, RateLimitStore};

/// Periodically evicts expired counters. Runs until the task is dropped.
pub async fn run_sweeper(store: Arc<dyn RateLimitStore>, interval_seconds: u64) {
    let mut interval = interval(Duration::from_secs(interval_seconds.max(1)));

    info!("Rate limit sweeper started - sweeping every {} seconds", interval_seconds);

    loop {
        interval.tick().await;

        match store.sweep(now_millis()).await {
            Ok(removed) => debug!(removed, "Expired rate limit entries swept"),
            Err(e) => error!(error = %e, "Rate limit sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::store::MemoryStore;

    const HOUR_MS: u64 = 3_600_000;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn add_expired(store: &MemoryStore, key: &str) {
        store.hit(key, 60_000, now_millis() - 120_000).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted_each_interval() {
        let store = Arc::new(MemoryStore::new());
        store.hit("api:ip:live", HOUR_MS, now_millis()).await.unwrap();
        add_expired(&store, "api:ip:stale-1").await;
        add_expired(&store, "ai:user:stale-2").await;
        assert_eq!(store.len(), 3);

        let handle = tokio::spawn(run_sweeper(store.clone(), 300));

        // The first tick fires immediately.
        settle().await;
        assert_eq!(store.len(), 1);
        assert!(store.get("api:ip:live").is_some());

        add_expired(&store, "api:ip:stale-3").await;
        tokio::time::advance(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(store.len(), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(store.len(), 1);
        assert!(store.get("api:ip:stale-3").is_none());

        handle.abort();
    }
}
