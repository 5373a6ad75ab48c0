use std::fmt;

use axum::http::HeaderName;

use crate::config::PolicyLimits;

/// Caller classification that selects a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Anonymous,
    Authenticated,
    Admin,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Authenticated => "authenticated",
            Tier::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Response headers a policy stamps. The general and AI policies use
/// different names so both can appear on the same response.
#[derive(Debug, Clone)]
pub struct HeaderSet {
    pub limit: HeaderName,
    pub remaining: HeaderName,
    pub reset: HeaderName,
}

impl HeaderSet {
    pub fn general() -> Self {
        Self {
            limit: HeaderName::from_static("x-ratelimit-limit"),
            remaining: HeaderName::from_static("x-ratelimit-remaining"),
            reset: HeaderName::from_static("x-ratelimit-reset"),
        }
    }

    pub fn ai() -> Self {
        Self {
            limit: HeaderName::from_static("x-ai-ratelimit-limit"),
            remaining: HeaderName::from_static("x-ai-ratelimit-remaining"),
            reset: HeaderName::from_static("x-ai-ratelimit-reset"),
        }
    }
}

/// A tier table plus the behavior that differs between guarded route groups.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    /// Namespace for counters, so each policy keeps its own entry per client.
    pub scope: &'static str,
    pub anonymous: TierLimit,
    pub authenticated: TierLimit,
    pub admin: TierLimit,
    /// Anonymous callers are turned away before any counting.
    pub require_authentication: bool,
    pub headers: HeaderSet,
}

impl RatePolicy {
    pub fn general(limits: &PolicyLimits) -> Self {
        Self::from_limits("api", limits, false, HeaderSet::general())
    }

    /// The anonymous entry is kept from the configured table but is never
    /// consulted, since anonymous callers get a 401 first.
    pub fn ai(limits: &PolicyLimits) -> Self {
        Self::from_limits("ai", limits, true, HeaderSet::ai())
    }

    fn from_limits(
        scope: &'static str,
        limits: &PolicyLimits,
        require_authentication: bool,
        headers: HeaderSet,
    ) -> Self {
        let tier = |max_requests| TierLimit {
            max_requests,
            window_ms: limits.window_ms,
        };

        Self {
            scope,
            anonymous: tier(limits.anonymous),
            authenticated: tier(limits.authenticated),
            admin: tier(limits.admin),
            require_authentication,
            headers,
        }
    }

    pub fn limit_for(&self, tier: Tier) -> TierLimit {
        match tier {
            Tier::Anonymous => self.anonymous,
            Tier::Authenticated => self.authenticated,
            Tier::Admin => self.admin,
        }
    }
}
