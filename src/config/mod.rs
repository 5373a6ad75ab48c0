use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variables read once at startup for the AI quota tiers.
pub const AI_RATE_LIMIT_AUTHENTICATED: &str = "AI_RATE_LIMIT_AUTHENTICATED";
pub const AI_RATE_LIMIT_ADMIN: &str = "AI_RATE_LIMIT_ADMIN";

const DEFAULT_AI_AUTHENTICATED: u32 = 10;
const DEFAULT_AI_ADMIN: u32 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub rate_limiting: RateLimitingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

/// Where admitted `/api/v1` traffic is forwarded (the content API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1337".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the content API. Empty disables token
    /// decoding, so every caller is anonymous.
    pub jwt_secret: String,
    /// Role names classified as the admin tier (case-insensitive).
    pub admin_roles: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            admin_roles: vec!["admin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub store: StoreKind,
    pub redis_url: String,
    pub sweep_interval_seconds: u64,
    pub trust_forwarded_headers: bool,
    pub api: PolicyLimits,
    pub ai: PolicyLimits,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: StoreKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            sweep_interval_seconds: 300,
            trust_forwarded_headers: true,
            api: PolicyLimits {
                window_ms: 60_000,
                anonymous: 100,
                authenticated: 500,
                admin: 1000,
            },
            ai: PolicyLimits {
                window_ms: 60_000,
                anonymous: 0,
                authenticated: DEFAULT_AI_AUTHENTICATED,
                admin: DEFAULT_AI_ADMIN,
            },
        }
    }
}

/// Per-tier request allowance for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLimits {
    pub window_ms: u64,
    pub anonymous: u32,
    pub authenticated: u32,
    pub admin: u32,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "config/default.yaml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        // Override with environment variables if present
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>()?)?;
        }
        if let Ok(metrics_port) = std::env::var("METRICS_PORT") {
            builder = builder.set_override("metrics.port", metrics_port.parse::<u16>()?)?;
        }
        if let Ok(upstream) = std::env::var("UPSTREAM_URL") {
            builder = builder.set_override("upstream.base_url", upstream)?;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", secret)?;
        }
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            builder = builder.set_override("rate_limiting.redis_url", redis_url)?;
        }

        let settings = builder.build()?;
        let mut config: AppConfig = settings.try_deserialize()?;

        let ai = &mut config.rate_limiting.ai;
        if let Some(limit) = limit_override(
            AI_RATE_LIMIT_AUTHENTICATED,
            std::env::var(AI_RATE_LIMIT_AUTHENTICATED).ok().as_deref(),
            DEFAULT_AI_AUTHENTICATED,
        ) {
            ai.authenticated = limit;
        }
        if let Some(limit) = limit_override(
            AI_RATE_LIMIT_ADMIN,
            std::env::var(AI_RATE_LIMIT_ADMIN).ok().as_deref(),
            DEFAULT_AI_ADMIN,
        ) {
            ai.admin = limit;
        }

        Ok(config)
    }
}

/// Resolves an integer quota override. Absent means "keep the configured
/// value"; present but unparsable falls back to `default`.
pub fn limit_override(var: &str, raw: Option<&str>, default: u32) -> Option<u32> {
    let raw = raw?;
    match raw.trim().parse::<u32>() {
        Ok(limit) => Some(limit),
        Err(e) => {
            warn!(var, value = raw, error = %e, default, "Invalid rate limit override, using default");
            Some(default)
        }
    }
}
