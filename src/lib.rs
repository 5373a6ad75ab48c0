use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{any, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

pub mod config;
pub mod docs;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod routes;

use config::AppConfig;
use middleware::{auth_middleware, rate_limit_middleware, TokenVerifier};
use rate_limit::{RateLimitStore, RateLimiter, RatePolicy};
use routes::{health, proxy};

/// AI feature endpoints; guarded by the AI policy on top of the general one.
pub const AI_ROUTES: [&str; 6] = [
    "/api/v1/ai/moderate",
    "/api/v1/ai/summarize",
    "/api/v1/ai/generate-tags",
    "/api/v1/ai/generate-quiz",
    "/api/v1/ai/search",
    "/api/v1/ai/recommend",
];
pub const AI_JOB_STATUS_ROUTE: &str = "/api/v1/ai/jobs/:job_id";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upstream: proxy::Upstream,
    pub verifier: Arc<TokenVerifier>,
    pub api_limiter: Option<Arc<RateLimiter>>,
    pub ai_limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn RateLimitStore>) -> anyhow::Result<Self> {
        let upstream = proxy::Upstream::new(&config.upstream)?;
        let verifier = Arc::new(TokenVerifier::new(&config.auth));

        let limiting = &config.rate_limiting;
        let limiter = |policy: RatePolicy| {
            Arc::new(
                RateLimiter::new(policy, store.clone())
                    .with_forwarded_headers(limiting.trust_forwarded_headers),
            )
        };
        let (api_limiter, ai_limiter) = if limiting.enabled {
            (
                Some(limiter(RatePolicy::general(&limiting.api))),
                Some(limiter(RatePolicy::ai(&limiting.ai))),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            config: Arc::new(config),
            upstream,
            verifier,
            api_limiter,
            ai_limiter,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let mut api_routes = Router::new()
        .route("/api/v1/health", get(health::health_detailed))
        .route("/api/v1/*rest", any(proxy::forward));

    let mut ai_routes = Router::new().route(AI_JOB_STATUS_ROUTE, get(proxy::forward));
    for path in AI_ROUTES {
        ai_routes = ai_routes.route(path, post(proxy::forward));
    }

    if let Some(limiter) = &state.api_limiter {
        let general = from_fn_with_state(limiter.clone(), rate_limit_middleware);
        api_routes = api_routes.route_layer(general.clone());
        ai_routes = ai_routes.route_layer(general);
    }
    // Outermost on AI routes, so a refused anonymous call counts nowhere.
    if let Some(limiter) = &state.ai_limiter {
        ai_routes = ai_routes.route_layer(from_fn_with_state(limiter.clone(), rate_limit_middleware));
    }

    // Identity must be known before either limiter runs.
    let api_routes = api_routes
        .merge(ai_routes)
        .layer(from_fn_with_state(state.verifier.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health::health))
        .merge(api_routes)
        .merge(docs::create_swagger_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(
                    state.config.server.timeout_seconds,
                ))),
        )
        .with_state(state)
}
