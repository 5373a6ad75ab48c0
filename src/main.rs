use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosque_gateway::{
    config::AppConfig,
    create_app,
    rate_limit::{store::build_store, sweeper::run_sweeper},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");

    init_metrics(&config)?;

    let store = build_store(&config.rate_limiting).await?;
    if config.rate_limiting.enabled {
        tokio::spawn(run_sweeper(
            store.clone(),
            config.rate_limiting.sweep_interval_seconds,
        ));
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(
        store = ?config.rate_limiting.store,
        upstream = %config.upstream.base_url,
        rate_limiting = config.rate_limiting.enabled,
        "Gateway configured"
    );

    let state = AppState::new(config, store)?;
    let app = create_app(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Mosque gateway starting on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_tracing() -> Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::registry();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_format.as_str() {
        "json" => {
            subscriber
                .with(tracing_subscriber::fmt::layer().json())
                .with(filter)
                .init();
        }
        _ => {
            subscriber
                .with(tracing_subscriber::fmt::layer())
                .with(filter)
                .init();
        }
    }

    Ok(())
}

fn init_metrics(config: &AppConfig) -> Result<()> {
    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;

        info!("Metrics exporter initialized on port {}", config.metrics.port);
    }

    Ok(())
}
