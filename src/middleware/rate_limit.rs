use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::{
    error::ApiError,
    metrics::{record_rate_limit_decision, Outcome},
    rate_limit::{Decision, HeaderSet, Identity, Quota, RateLimiter},
};

/// Guards the wrapped routes with one rate limit policy. Counted requests
/// carry the policy's quota headers whether they were admitted or not.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let caller = limiter.caller(request.extensions().get::<Identity>(), request.headers(), peer);
    let policy = limiter.policy();

    match limiter.check(&caller).await {
        Ok(Decision::Admitted(quota)) => {
            record_rate_limit_decision(policy.scope, caller.tier, Outcome::Admitted);
            let mut response = next.run(request).await;
            stamp_quota_headers(&mut response, &policy.headers, &quota);
            response
        }
        Ok(Decision::Limited(quota)) => {
            record_rate_limit_decision(policy.scope, caller.tier, Outcome::Limited);
            warn!(
                key = %caller.key,
                tier = %caller.tier,
                policy = policy.scope,
                path = request.uri().path(),
                "Rate limit exceeded"
            );
            let mut response = ApiError::TooManyRequests {
                retry_after: quota.reset_in_seconds,
                limit: quota.limit,
                window_ms: quota.window_ms,
            }
            .into_response();
            stamp_quota_headers(&mut response, &policy.headers, &quota);
            response
        }
        Ok(Decision::Unauthenticated) => {
            record_rate_limit_decision(policy.scope, caller.tier, Outcome::Unauthenticated);
            info!(
                key = %caller.key,
                policy = policy.scope,
                path = request.uri().path(),
                "Anonymous request refused"
            );
            ApiError::Unauthorized.into_response()
        }
        Err(e) => {
            // Fail open: a broken counter store must not take the API down.
            record_rate_limit_decision(policy.scope, caller.tier, Outcome::StoreError);
            error!(
                key = %caller.key,
                policy = policy.scope,
                error = %e,
                "Rate limit store unavailable, admitting request"
            );
            next.run(request).await
        }
    }
}

fn stamp_quota_headers(response: &mut Response, names: &HeaderSet, quota: &Quota) {
    let headers = response.headers_mut();
    headers.insert(names.limit.clone(), HeaderValue::from(quota.limit));
    headers.insert(names.remaining.clone(), HeaderValue::from(quota.remaining));
    headers.insert(names.reset.clone(), HeaderValue::from(quota.reset_in_seconds));
}
