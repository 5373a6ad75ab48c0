use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use tracing::{error, info};

use crate::{config::UpstreamConfig, error::ApiError, metrics::record_upstream_request, AppState};

const API_PREFIX: &str = "/api/v1";
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// HTTP client bound to the content API.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        // The content API sits on the private network; never route it through
        // an outbound proxy picked up from the environment.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `/api/v1/events?page=2` on the gateway is `/api/events?page=2` upstream.
    pub fn url_for(&self, path_and_query: &str) -> String {
        let rest = path_and_query.strip_prefix(API_PREFIX).unwrap_or(path_and_query);
        format!("{}/api{}", self.base_url, rest)
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::HOST
        || *name == header::CONNECTION
        || *name == header::UPGRADE
        || *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
}

fn forwardable(headers: &HeaderMap) -> impl Iterator<Item = (&HeaderName, &axum::http::HeaderValue)> {
    headers.iter().filter(|(name, _)| !is_hop_by_hop(name))
}

/// Relays an admitted request to the content API.
pub async fn forward(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(parts.uri.path());
    let url = state.upstream.url_for(path_and_query);

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    let mut upstream_request = state.upstream.client.request(parts.method.clone(), &url);
    for (key, value) in forwardable(&parts.headers) {
        upstream_request = upstream_request.header(key, value);
    }
    upstream_request = upstream_request
        .header("X-Routed-By", "mosque-gateway")
        .body(body);

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(e) => {
            let latency = start_time.elapsed();
            if e.is_timeout() {
                error!(url = %url, "Upstream request timed out");
                record_upstream_request(504, latency.as_secs_f64());
                return Err(ApiError::GatewayTimeout);
            }
            error!(url = %url, error = %e, "Upstream request failed");
            record_upstream_request(502, latency.as_secs_f64());
            return Err(ApiError::BadGateway);
        }
    };

    let status = upstream_response.status();
    let mut response_builder = Response::builder().status(status);
    for (key, value) in forwardable(upstream_response.headers()) {
        response_builder = response_builder.header(key, value);
    }

    let body_bytes = upstream_response.bytes().await.map_err(|e| {
        error!(url = %url, error = %e, "Failed to read upstream response body");
        record_upstream_request(502, start_time.elapsed().as_secs_f64());
        ApiError::BadGateway
    })?;

    let latency = start_time.elapsed();
    info!(
        method = %parts.method,
        path = parts.uri.path(),
        status = status.as_u16(),
        latency_ms = latency.as_millis() as u64,
        "Upstream response"
    );
    record_upstream_request(status.as_u16(), latency.as_secs_f64());

    response_builder
        .body(Body::from(body_bytes))
        .map_err(|e| {
            error!(error = %e, "Failed to build relayed response");
            ApiError::BadGateway
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(base_url: &str) -> Upstream {
        Upstream::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            timeout_ms: 1_000,
        })
        .unwrap()
    }

    #[test]
    fn rewrites_versioned_prefix() {
        let upstream = upstream("http://cms.local:1337/");
        assert_eq!(
            upstream.url_for("/api/v1/events?page=2"),
            "http://cms.local:1337/api/events?page=2"
        );
        assert_eq!(
            upstream.url_for("/api/v1/ai/jobs/17"),
            "http://cms.local:1337/api/ai/jobs/17"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "gateway".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, "3".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer t".parse().unwrap());

        let names: Vec<_> = forwardable(&headers).map(|(name, _)| name.clone()).collect();
        assert_eq!(names, vec![header::AUTHORIZATION]);
    }
}
