//! Tiered fixed-window request throttling.
//!
//! One [`RateLimiter`] is built per [`RatePolicy`]; the general API guard
//! and the AI guard differ only in their table, their header names and
//! whether anonymous callers are refused outright.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;

pub mod client;
pub mod policy;
pub mod store;
pub mod sweeper;

pub use client::{Caller, ClientKey, Identity};
pub use policy::{HeaderSet, RatePolicy, Tier, TierLimit};
pub use store::{RateLimitEntry, RateLimitStore, StoreError};

/// Quota state reported to the caller through headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_seconds: u64,
    pub window_ms: u64,
}

impl Quota {
    fn from_entry(entry: &RateLimitEntry, limit: TierLimit, now_ms: i64) -> Self {
        let remaining = u64::from(limit.max_requests).saturating_sub(entry.count) as u32;
        let until_reset_ms = entry.window_reset_at.saturating_sub(now_ms).max(0) as u64;

        Self {
            limit: limit.max_requests,
            remaining,
            reset_in_seconds: until_reset_ms.div_ceil(1000),
            window_ms: limit.window_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted(Quota),
    Limited(Quota),
    /// The policy refuses anonymous callers; nothing was counted.
    Unauthenticated,
}

pub struct RateLimiter {
    policy: RatePolicy,
    store: Arc<dyn RateLimitStore>,
    trust_forwarded_headers: bool,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            policy,
            store,
            trust_forwarded_headers: true,
        }
    }

    /// Whether `X-Forwarded-For` / `X-Real-IP` may name the client. These
    /// headers are client-controlled unless a proxy in front rewrites them.
    pub fn with_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    pub fn caller(
        &self,
        identity: Option<&Identity>,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Caller {
        Caller::resolve(identity, headers, peer, self.trust_forwarded_headers)
    }

    pub fn store_key(&self, key: &ClientKey) -> String {
        format!("{}:{}", self.policy.scope, key)
    }

    pub async fn check(&self, caller: &Caller) -> Result<Decision, StoreError> {
        self.check_at(caller, now_millis()).await
    }

    pub async fn check_at(&self, caller: &Caller, now_ms: i64) -> Result<Decision, StoreError> {
        if caller.tier == Tier::Anonymous && self.policy.require_authentication {
            return Ok(Decision::Unauthenticated);
        }

        let limit = self.policy.limit_for(caller.tier);
        let entry = self
            .store
            .hit(&self.store_key(&caller.key), limit.window_ms, now_ms)
            .await?;
        let quota = Quota::from_entry(&entry, limit, now_ms);

        // Reaching the limit exactly is still allowed.
        if entry.count > u64::from(limit.max_requests) {
            Ok(Decision::Limited(quota))
        } else {
            Ok(Decision::Admitted(quota))
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use store::MemoryStore;

    const T0: i64 = 1_700_000_000_000;

    fn general(store: Arc<MemoryStore>) -> RateLimiter {
        RateLimiter::new(RatePolicy::general(&RateLimitingConfig::default().api), store)
    }

    fn ai(store: Arc<MemoryStore>) -> RateLimiter {
        RateLimiter::new(RatePolicy::ai(&RateLimitingConfig::default().ai), store)
    }

    fn anonymous(ip: &str) -> Caller {
        Caller {
            key: ClientKey::Address(ip.to_string()),
            tier: Tier::Anonymous,
        }
    }

    fn member(id: &str) -> Caller {
        Caller {
            key: ClientKey::User(id.to_string()),
            tier: Tier::Authenticated,
        }
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let limiter = ai(Arc::new(MemoryStore::new()));
        let caller = member("u-42");

        for i in 1..=10u32 {
            match limiter.check_at(&caller, T0 + i as i64).await.unwrap() {
                Decision::Admitted(quota) => assert_eq!(quota.remaining, 10 - i),
                other => panic!("request {} should be admitted, got {:?}", i, other),
            }
        }

        match limiter.check_at(&caller, T0 + 11).await.unwrap() {
            Decision::Limited(quota) => {
                assert_eq!(quota.limit, 10);
                assert_eq!(quota.remaining, 0);
            }
            other => panic!("11th request should be limited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn request_at_exact_limit_is_admitted() {
        let limiter = general(Arc::new(MemoryStore::new()));
        let caller = anonymous("1.2.3.4");

        let mut last = None;
        for _ in 0..100 {
            last = Some(limiter.check_at(&caller, T0).await.unwrap());
        }
        assert!(matches!(last, Some(Decision::Admitted(q)) if q.remaining == 0));
    }

    #[tokio::test]
    async fn rollover_starts_a_new_window() {
        let limiter = ai(Arc::new(MemoryStore::new()));
        let caller = member("u-7");

        for _ in 0..11 {
            limiter.check_at(&caller, T0).await.unwrap();
        }
        // Still inside the window at exactly reset time.
        assert!(matches!(
            limiter.check_at(&caller, T0 + 60_000).await.unwrap(),
            Decision::Limited(_)
        ));

        match limiter.check_at(&caller, T0 + 60_001).await.unwrap() {
            Decision::Admitted(quota) => {
                assert_eq!(quota.remaining, 9);
                assert_eq!(quota.reset_in_seconds, 60);
            }
            other => panic!("expected admission after rollover, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_seconds_round_up() {
        let limiter = general(Arc::new(MemoryStore::new()));
        let caller = anonymous("5.6.7.8");

        let first = limiter.check_at(&caller, T0).await.unwrap();
        assert!(matches!(first, Decision::Admitted(q) if q.reset_in_seconds == 60));

        let later = limiter.check_at(&caller, T0 + 1_500).await.unwrap();
        assert!(matches!(later, Decision::Admitted(q) if q.reset_in_seconds == 59));

        let last_ms = limiter.check_at(&caller, T0 + 59_999).await.unwrap();
        assert!(matches!(last_ms, Decision::Admitted(q) if q.reset_in_seconds == 1));

        let at_reset = limiter.check_at(&caller, T0 + 60_000).await.unwrap();
        assert!(matches!(at_reset, Decision::Admitted(q) if q.reset_in_seconds == 0));
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let limiter = ai(Arc::new(MemoryStore::new()));
        let noisy = member("noisy");
        let quiet = member("quiet");

        for _ in 0..20 {
            limiter.check_at(&noisy, T0).await.unwrap();
        }
        assert!(matches!(
            limiter.check_at(&noisy, T0).await.unwrap(),
            Decision::Limited(_)
        ));
        assert!(matches!(
            limiter.check_at(&quiet, T0).await.unwrap(),
            Decision::Admitted(q) if q.remaining == 9
        ));
    }

    #[tokio::test]
    async fn policies_keep_separate_counters() {
        let store = Arc::new(MemoryStore::new());
        let api = general(store.clone());
        let ai = ai(store.clone());
        let caller = member("u-42");

        api.check_at(&caller, T0).await.unwrap();
        ai.check_at(&caller, T0).await.unwrap();
        ai.check_at(&caller, T0).await.unwrap();

        let api_entry = store.get("api:user:u-42").unwrap();
        let ai_entry = store.get("ai:user:u-42").unwrap();
        assert_eq!(api_entry.count, 1);
        assert_eq!(ai_entry.count, 2);
    }

    #[tokio::test]
    async fn anonymous_ai_caller_is_refused_without_counting() {
        let store = Arc::new(MemoryStore::new());
        let limiter = ai(store.clone());

        let decision = limiter.check_at(&anonymous("1.2.3.4"), T0).await.unwrap();
        assert_eq!(decision, Decision::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn admin_tier_uses_admin_limit() {
        let limiter = ai(Arc::new(MemoryStore::new()));
        let admin = Caller {
            key: ClientKey::User("imam".to_string()),
            tier: Tier::Admin,
        };

        match limiter.check_at(&admin, T0).await.unwrap() {
            Decision::Admitted(quota) => {
                assert_eq!(quota.limit, 50);
                assert_eq!(quota.remaining, 49);
            }
            other => panic!("expected admission, got {:?}", other),
        }
    }
}
