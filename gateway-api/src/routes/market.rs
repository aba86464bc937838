//! Market data routes

use super::ApiError;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use gateway_core::{
    BookSpread, Exchange, GatewayError, GatewayResult, HistoricalDataRequest, MarketDataRequest,
    OhlcvData, OrderBookData, TickerData, Timeframe, DEFAULT_HISTORY_LIMIT,
};
use gateway_services::{MovingAverageSignal, PriceComparison, PriceStatistics, VolumeAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

const DEFAULT_BOOK_DEPTH: usize = 20;
const MAX_BOOK_DEPTH: usize = 1000;
const DEFAULT_SHORT_PERIOD: usize = 20;
const DEFAULT_LONG_PERIOD: usize = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ticker", get(get_ticker))
        .route("/orderbook", get(get_orderbook))
        .route("/ohlcv", get(get_ohlcv))
        .route("/tickers", get(get_tickers))
        .route("/statistics", get(get_statistics))
        .route("/compare", get(compare_prices))
        .route("/moving-average", get(get_moving_average))
        .route("/volume", get(get_volume))
}

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MarketQuery {
    pub symbol: String,
    /// Defaults to Binance
    pub exchange: Option<String>,
}

impl MarketQuery {
    fn request(&self) -> GatewayResult<MarketDataRequest> {
        market_request(&self.symbol, self.exchange.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderBookQuery {
    pub symbol: String,
    pub exchange: Option<String>,
    /// Levels per side, 1..=1000
    pub limit: Option<usize>,
}

/// Historical window shared by the OHLCV-backed endpoints
///
/// `short` and `long` are only read by the moving-average endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub symbol: String,
    pub exchange: Option<String>,
    pub timeframe: Option<String>,
    pub limit: Option<u32>,
    /// Epoch milliseconds
    pub since: Option<i64>,
    pub short: Option<usize>,
    pub long: Option<usize>,
}

impl HistoricalQuery {
    fn request(&self) -> GatewayResult<HistoricalDataRequest> {
        let market = market_request(&self.symbol, self.exchange.as_deref())?;
        let timeframe = match self.timeframe.as_deref() {
            Some(tf) => tf.parse()?,
            None => Timeframe::default(),
        };
        let since = self.since.map(since_from_millis).transpose()?;

        HistoricalDataRequest::new(
            market,
            timeframe,
            self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            since,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct MultiExchangeQuery {
    pub symbol: String,
    /// Comma-separated exchange ids; absent means every exchange
    pub exchanges: Option<String>,
}

impl MultiExchangeQuery {
    fn exchanges(&self) -> GatewayResult<Option<Vec<Exchange>>> {
        parse_exchange_list(self.exchanges.as_deref())
    }
}

fn market_request(symbol: &str, exchange: Option<&str>) -> GatewayResult<MarketDataRequest> {
    let exchange = match exchange {
        Some(id) => id.parse()?,
        None => Exchange::default(),
    };
    MarketDataRequest::new(symbol, exchange)
}

fn since_from_millis(ms: i64) -> GatewayResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| GatewayError::validation(format!("since out of range: {}", ms)))
}

/// Parse `"binance, kraken"` into exchanges; blank input counts as absent
fn parse_exchange_list(raw: Option<&str>) -> GatewayResult<Option<Vec<Exchange>>> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::parse)
        .collect::<GatewayResult<Vec<Exchange>>>()
        .map(Some)
}

// ============================================================================
// Single-exchange Endpoints
// ============================================================================

async fn get_ticker(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<TickerData>, ApiError> {
    let request = query.request()?;
    info!("Getting ticker for {} on {}", request.symbol(), request.exchange());

    Ok(Json(state.service.get_ticker(&request).await?))
}

/// Order book plus its top-of-book summary; `spread` is null when a side is empty
#[derive(Debug, Serialize)]
pub struct OrderBookResponse {
    #[serde(flatten)]
    pub book: OrderBookData,
    pub spread: Option<BookSpread>,
}

async fn get_orderbook(
    State(state): State<AppState>,
    Query(query): Query<OrderBookQuery>,
) -> Result<Json<OrderBookResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_BOOK_DEPTH);
    if !(1..=MAX_BOOK_DEPTH).contains(&limit) {
        return Err(GatewayError::validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_BOOK_DEPTH, limit
        ))
        .into());
    }

    let request = market_request(&query.symbol, query.exchange.as_deref())?;
    info!(
        "Getting order book for {} on {} (depth {})",
        request.symbol(),
        request.exchange(),
        limit
    );

    let book = state.service.get_orderbook(&request, limit).await?;
    Ok(Json(OrderBookResponse {
        spread: book.spread(),
        book,
    }))
}

async fn get_ohlcv(
    State(state): State<AppState>,
    Query(query): Query<HistoricalQuery>,
) -> Result<Json<Vec<OhlcvData>>, ApiError> {
    let request = query.request()?;
    info!(
        "Getting {} OHLCV for {} on {} (limit {})",
        request.timeframe(),
        request.symbol(),
        request.exchange(),
        request.limit()
    );

    let candles = state.service.get_ohlcv(&request).await?;
    Ok(Json(candles.to_vec()))
}

// ============================================================================
// Multi-exchange Endpoints
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TickersResponse {
    pub symbol: String,
    pub tickers: HashMap<Exchange, TickerData>,
    pub count: usize,
}

async fn get_tickers(
    State(state): State<AppState>,
    Query(query): Query<MultiExchangeQuery>,
) -> Result<Json<TickersResponse>, ApiError> {
    let exchanges = query.exchanges()?;
    info!("Getting tickers for {} across {:?}", query.symbol, exchanges);

    let tickers = state
        .service
        .get_multi_exchange_ticker(&query.symbol, exchanges.as_deref())
        .await;

    Ok(Json(TickersResponse {
        symbol: query.symbol.trim().to_uppercase(),
        count: tickers.len(),
        tickers,
    }))
}

async fn compare_prices(
    State(state): State<AppState>,
    Query(query): Query<MultiExchangeQuery>,
) -> Result<Json<PriceComparison>, ApiError> {
    let exchanges = query.exchanges()?;
    info!("Comparing prices for {}", query.symbol);

    let comparison = state
        .service
        .compare_prices(&query.symbol, exchanges.as_deref())
        .await?;
    Ok(Json(comparison))
}

// ============================================================================
// Analytics Endpoints
// ============================================================================

async fn get_statistics(
    State(state): State<AppState>,
    Query(query): Query<HistoricalQuery>,
) -> Result<Json<PriceStatistics>, ApiError> {
    let request = query.request()?;
    info!("Getting statistics for {} on {}", request.symbol(), request.exchange());

    Ok(Json(state.service.get_price_statistics(&request).await?))
}

async fn get_moving_average(
    State(state): State<AppState>,
    Query(query): Query<HistoricalQuery>,
) -> Result<Json<MovingAverageSignal>, ApiError> {
    let request = query.request()?;
    let short = query.short.unwrap_or(DEFAULT_SHORT_PERIOD);
    let long = query.long.unwrap_or(DEFAULT_LONG_PERIOD);
    info!(
        "Getting SMA({}/{}) signal for {} on {}",
        short,
        long,
        request.symbol(),
        request.exchange()
    );

    let signal = state
        .service
        .get_moving_average_signal(&request, short, long)
        .await?;
    Ok(Json(signal))
}

async fn get_volume(
    State(state): State<AppState>,
    Query(query): Query<HistoricalQuery>,
) -> Result<Json<VolumeAnalysis>, ApiError> {
    let request = query.request()?;
    info!("Getting volume analysis for {} on {}", request.symbol(), request.exchange());

    Ok(Json(state.service.get_volume_analysis(&request).await?))
}
