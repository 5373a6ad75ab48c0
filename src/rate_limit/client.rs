use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderMap;

use super::policy::Tier;

/// Authenticated caller, attached to the request by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn tier(&self) -> Tier {
        if self.is_admin {
            Tier::Admin
        } else {
            Tier::Authenticated
        }
    }
}

/// Bucket a counter is kept under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(String),
    Address(String),
    /// Every caller without an identity or address shares this bucket.
    Unknown,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::User(id) => write!(f, "user:{}", id),
            ClientKey::Address(addr) => write!(f, "ip:{}", addr),
            ClientKey::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub key: ClientKey,
    pub tier: Tier,
}

impl Caller {
    /// Resolves the counter key: user id, then forwarded address (when
    /// trusted), then the peer address, then the shared sentinel.
    pub fn resolve(
        identity: Option<&Identity>,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded_headers: bool,
    ) -> Self {
        if let Some(identity) = identity {
            return Self {
                key: ClientKey::User(identity.user_id.clone()),
                tier: identity.tier(),
            };
        }

        let forwarded = if trust_forwarded_headers {
            forwarded_address(headers)
        } else {
            None
        };

        let key = forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .map(ClientKey::Address)
            .unwrap_or(ClientKey::Unknown);

        Self {
            key,
            tier: Tier::Anonymous,
        }
    }
}

fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .map(str::to_string)
}
