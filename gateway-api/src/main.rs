//! Crypto Market Data Gateway API Server
//!
//! HTTP API over the caching and aggregation engine.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use gateway_services::{GatewayConfig, MarketDataService};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MarketDataService>,
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gateway_api=debug")),
        )
        .init();

    info!("Starting Crypto Market Data Gateway");

    let config = GatewayConfig::from_env()?;
    info!(
        "Cache TTLs: ticker {}s, ohlcv {}s, orderbook {}s",
        config.cache.ticker.ttl_secs, config.cache.ohlcv.ttl_secs, config.cache.orderbook.ttl_secs
    );

    let service = Arc::new(MarketDataService::new(&config));
    info!(
        "Available exchanges: {:?}",
        service.registry().available()
    );

    let app = build_app(AppState { service });

    let port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
