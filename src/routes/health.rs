use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{config::StoreKind, rate_limit::RateLimiter, AppState};

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub upstream: String,
    pub rate_limiting: RateLimitingInfo,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RateLimitingInfo {
    pub enabled: bool,
    pub store: String,
    pub policies: Vec<PolicyInfo>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PolicyInfo {
    pub name: String,
    pub window_ms: u64,
    pub anonymous: u32,
    pub authenticated: u32,
    pub admin: u32,
    pub requires_authentication: bool,
}

impl PolicyInfo {
    fn from_limiter(limiter: &RateLimiter) -> Self {
        let policy = limiter.policy();
        Self {
            name: policy.scope.to_string(),
            window_ms: policy.authenticated.window_ms,
            anonymous: policy.anonymous.max_requests,
            authenticated: policy.authenticated.max_requests,
            admin: policy.admin.max_requests,
            requires_authentication: policy.require_authentication,
        }
    }
}

/// Basic health check endpoint
///
/// Returns a simple health status indicating the service is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "mosque-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Detailed health check endpoint
///
/// Reports the upstream the gateway forwards to and the active rate limit
/// policies. Itself subject to the general rate limit.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Detailed health information", body = DetailedHealthResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::error::ErrorEnvelope)
    )
)]
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    info!("Detailed health check requested");

    let store = match state.config.rate_limiting.store {
        StoreKind::Memory => "memory",
        StoreKind::Redis => "redis",
    };
    let policies = [&state.api_limiter, &state.ai_limiter]
        .into_iter()
        .flatten()
        .map(|limiter| PolicyInfo::from_limiter(limiter))
        .collect();

    Json(DetailedHealthResponse {
        status: "healthy".to_string(),
        service: "mosque-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        upstream: state.config.upstream.base_url.clone(),
        rate_limiting: RateLimitingInfo {
            enabled: state.config.rate_limiting.enabled,
            store: store.to_string(),
            policies,
        },
    })
}
