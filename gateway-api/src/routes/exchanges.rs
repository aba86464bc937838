//! Exchange metadata and cache maintenance routes

use super::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use gateway_core::Exchange;
use gateway_services::ExchangeInfo;
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/exchanges/{exchange}", get(get_exchange_info))
        .route("/exchanges/{exchange}/symbols", get(search_symbols))
        .route("/cache/clear", post(clear_cache))
}

#[derive(Debug, Deserialize)]
pub struct SymbolSearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SymbolSearchResponse {
    pub exchange: Exchange,
    pub symbols: Vec<String>,
    pub count: usize,
}

async fn get_exchange_info(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
) -> Result<Json<ExchangeInfo>, ApiError> {
    let exchange: Exchange = exchange.parse()?;
    info!("Getting exchange info for {}", exchange);

    Ok(Json(state.service.get_exchange_info(exchange).await?))
}

async fn search_symbols(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Query(query): Query<SymbolSearchQuery>,
) -> Result<Json<SymbolSearchResponse>, ApiError> {
    let exchange: Exchange = exchange.parse()?;
    info!("Searching {} symbols for '{}'", exchange, query.q);

    let symbols = state.service.search_symbols(&query.q, exchange).await?;
    Ok(Json(SymbolSearchResponse {
        exchange,
        count: symbols.len(),
        symbols,
    }))
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub cleared: bool,
}

async fn clear_cache(State(state): State<AppState>) -> Json<CacheClearResponse> {
    state.service.clear_cache();
    Json(CacheClearResponse { cleared: true })
}
