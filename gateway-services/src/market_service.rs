//! Market data aggregation engine
//!
//! Cache-aside reads for single-exchange queries, concurrent fan-out for
//! multi-exchange queries, and derived analytics on top of both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use gateway_core::{
    Exchange, GatewayError, GatewayResult, HistoricalDataRequest, MarketDataRequest, OhlcvData,
    OrderBookData, TickerData, Timeframe, UpstreamError,
};
use gateway_exchanges::{Capabilities, ExchangeDescription, RateLimiterStats};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::exchange_registry::{ExchangeHandle, ExchangeRegistry};
use crate::market_cache::{CacheStats, MarketCache};
use crate::market_stats::{MovingAverageSignal, PriceComparison, PriceStatistics, VolumeAnalysis};
use crate::normalize;

/// Maximum number of symbols returned by a search
pub const SYMBOL_SEARCH_LIMIT: usize = 50;

/// Request and error counters
#[derive(Debug, Default)]
struct RequestMetrics {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
}

impl RequestMetrics {
    fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    fn errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of the engine
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    /// errors / max(requests, 1)
    pub error_rate: f64,
    pub cache_stats: CacheStats,
    pub supported_exchanges: Vec<Exchange>,
    pub available_exchanges: Vec<Exchange>,
    pub supported_timeframes: Vec<Timeframe>,
}

/// Exchange metadata plus the size of its loaded catalog
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeInfo {
    pub id: Exchange,
    pub name: &'static str,
    pub countries: Vec<&'static str>,
    pub has: Capabilities,
    pub timeframes: Vec<Timeframe>,
    pub markets_count: usize,
    pub rate_limit_ms: u64,
    /// Live pacing counters, absent when rate limiting is off
    pub pacing: Option<RateLimiterStats>,
}

impl ExchangeInfo {
    fn new(
        description: ExchangeDescription,
        markets_count: usize,
        pacing: Option<RateLimiterStats>,
    ) -> Self {
        Self {
            id: description.id,
            name: description.name,
            countries: description.countries,
            has: description.has,
            timeframes: description.timeframes,
            markets_count,
            rate_limit_ms: description.rate_limit_ms,
            pacing,
        }
    }
}

/// The aggregation engine
pub struct MarketDataService {
    cache: MarketCache,
    registry: Arc<ExchangeRegistry>,
    metrics: RequestMetrics,
    started_at: Instant,
    fanout_timeout: Option<Duration>,
}

impl MarketDataService {
    /// Create an engine with REST connectors for every supported exchange
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_registry(config, Arc::new(ExchangeRegistry::new(&config.connector)))
    }

    /// Create an engine over an existing registry
    pub fn with_registry(config: &GatewayConfig, registry: Arc<ExchangeRegistry>) -> Self {
        Self {
            cache: MarketCache::new(&config.cache),
            registry,
            metrics: RequestMetrics::default(),
            started_at: Instant::now(),
            fanout_timeout: config.fanout_timeout(),
        }
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &MarketCache {
        &self.cache
    }

    // ========================================================================
    // Single-exchange reads
    // ========================================================================

    /// Current ticker for one symbol on one exchange
    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_ticker(&self, request: &MarketDataRequest) -> GatewayResult<TickerData> {
        self.metrics.record_request();

        let key = MarketCache::ticker_key(request);
        if let Some(ticker) = self.cache.get_ticker(&key) {
            return Ok(ticker);
        }

        let ticker = self.counted("ticker", request.exchange(), self.fetch_ticker(request).await)?;
        self.cache.put_ticker(key, ticker.clone());

        info!("Fetched ticker for {} on {}", request.symbol(), request.exchange());
        Ok(ticker)
    }

    /// Order book with at most `limit` levels per side
    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_orderbook(
        &self,
        request: &MarketDataRequest,
        limit: usize,
    ) -> GatewayResult<OrderBookData> {
        self.metrics.record_request();

        let key = MarketCache::orderbook_key(request, limit);
        if let Some(book) = self.cache.get_orderbook(&key) {
            return Ok(book);
        }

        let book = self.counted(
            "orderbook",
            request.exchange(),
            self.fetch_orderbook(request, limit).await,
        )?;
        self.cache.put_orderbook(key, book.clone());

        info!(
            "Fetched order book for {} on {} ({} bids, {} asks)",
            request.symbol(),
            request.exchange(),
            book.bids.len(),
            book.asks.len()
        );
        Ok(book)
    }

    /// Historical candles, oldest first
    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_ohlcv(
        &self,
        request: &HistoricalDataRequest,
    ) -> GatewayResult<Arc<Vec<OhlcvData>>> {
        self.metrics.record_request();

        let key = MarketCache::ohlcv_key(request);
        if let Some(candles) = self.cache.get_ohlcv(&key) {
            return Ok(candles);
        }

        let candles = Arc::new(self.counted(
            "OHLCV",
            request.exchange(),
            self.fetch_ohlcv(request).await,
        )?);
        self.cache.put_ohlcv(key, Arc::clone(&candles));

        info!(
            "Fetched {} OHLCV candles for {} on {}",
            candles.len(),
            request.symbol(),
            request.exchange()
        );
        Ok(candles)
    }

    /// Count and log a failed single-exchange operation, passing the result through
    fn counted<T>(
        &self,
        operation: &str,
        exchange: Exchange,
        result: GatewayResult<T>,
    ) -> GatewayResult<T> {
        if let Err(e) = &result {
            self.metrics.record_error();
            error!("Error fetching {} from {}: {}", operation, exchange, e);
        }
        result
    }

    /// Resolve the handle, load its catalog and check the exchange lists `symbol`
    ///
    /// An empty catalog lists nothing to check against and lets every symbol through.
    async fn ready_handle(
        &self,
        operation: &'static str,
        exchange: Exchange,
        symbol: &str,
    ) -> GatewayResult<Arc<ExchangeHandle>> {
        let handle = self.registry.get_handle(exchange)?;
        let catalog = handle
            .ensure_markets_loaded()
            .await
            .map_err(|e| GatewayError::fetch(operation, exchange.id(), e))?;

        if !catalog.is_empty() {
            let market = catalog.get(symbol).ok_or_else(|| {
                GatewayError::fetch(
                    operation,
                    exchange.id(),
                    UpstreamError::exchange(format!(
                        "{} does not list {}",
                        exchange.display_name(),
                        symbol
                    )),
                )
            })?;
            debug!("{} resolves to {} on {}", symbol, market.id, exchange);
        }
        Ok(handle)
    }

    async fn fetch_ticker(&self, request: &MarketDataRequest) -> GatewayResult<TickerData> {
        let exchange = request.exchange();
        let handle = self.ready_handle("ticker", exchange, request.symbol()).await?;

        handle
            .connector()
            .fetch_ticker(request.symbol())
            .await
            .and_then(|raw| normalize::ticker(request, raw))
            .map_err(|e| GatewayError::fetch("ticker", exchange.id(), e))
    }

    async fn fetch_orderbook(
        &self,
        request: &MarketDataRequest,
        limit: usize,
    ) -> GatewayResult<OrderBookData> {
        let exchange = request.exchange();
        let handle = self.ready_handle("orderbook", exchange, request.symbol()).await?;

        let raw = handle
            .connector()
            .fetch_order_book(request.symbol(), limit)
            .await
            .map_err(|e| GatewayError::fetch("orderbook", exchange.id(), e))?;
        Ok(normalize::order_book(request, raw, limit))
    }

    async fn fetch_ohlcv(&self, request: &HistoricalDataRequest) -> GatewayResult<Vec<OhlcvData>> {
        let exchange = request.exchange();
        let handle = self.ready_handle("OHLCV", exchange, request.symbol()).await?;

        handle
            .connector()
            .fetch_ohlcv(
                request.symbol(),
                request.timeframe(),
                request.since_millis(),
                request.limit(),
            )
            .await
            .and_then(normalize::candles)
            .map_err(|e| GatewayError::fetch("OHLCV", exchange.id(), e))
    }

    // ========================================================================
    // Multi-exchange fan-out
    // ========================================================================

    /// Ticker for `symbol` from several exchanges at once
    ///
    /// Exchanges that fail (bad symbol, upstream fault, timeout) are logged
    /// and left out of the result, which may therefore be empty. `None`
    /// queries every supported exchange.
    #[instrument(skip(self))]
    pub async fn get_multi_exchange_ticker(
        &self,
        symbol: &str,
        exchanges: Option<&[Exchange]>,
    ) -> HashMap<Exchange, TickerData> {
        let mut targets: Vec<Exchange> = exchanges.unwrap_or(&Exchange::ALL).to_vec();
        targets.sort();
        targets.dedup();

        let lookups = targets.into_iter().map(|exchange| async move {
            let result = match MarketDataRequest::new(symbol, exchange) {
                Ok(request) => self.ticker_with_deadline(&request).await,
                Err(e) => Err(e),
            };
            (exchange, result)
        });

        let mut tickers = HashMap::new();
        for (exchange, result) in join_all(lookups).await {
            match result {
                Ok(ticker) => {
                    tickers.insert(exchange, ticker);
                }
                Err(e) => {
                    warn!("Failed to get ticker from {}: {}", exchange, e);
                }
            }
        }

        debug!("Got {} tickers for {}", tickers.len(), symbol);
        tickers
    }

    async fn ticker_with_deadline(&self, request: &MarketDataRequest) -> GatewayResult<TickerData> {
        let Some(deadline) = self.fanout_timeout else {
            return self.get_ticker(request).await;
        };

        match tokio::time::timeout(deadline, self.get_ticker(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_error();
                Err(GatewayError::fetch(
                    "ticker",
                    request.exchange().id(),
                    UpstreamError::network(format!("timed out after {}ms", deadline.as_millis())),
                ))
            }
        }
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_price_statistics(
        &self,
        request: &HistoricalDataRequest,
    ) -> GatewayResult<PriceStatistics> {
        let candles = self.get_ohlcv(request).await?;
        PriceStatistics::compute(request, &candles)
    }

    /// Lowest and highest last price across exchanges
    #[instrument(skip(self))]
    pub async fn compare_prices(
        &self,
        symbol: &str,
        exchanges: Option<&[Exchange]>,
    ) -> GatewayResult<PriceComparison> {
        let tickers = self.get_multi_exchange_ticker(symbol, exchanges).await;
        PriceComparison::compute(&symbol.trim().to_uppercase(), &tickers)
    }

    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_moving_average_signal(
        &self,
        request: &HistoricalDataRequest,
        short: usize,
        long: usize,
    ) -> GatewayResult<MovingAverageSignal> {
        MovingAverageSignal::validate_periods(short, long)?;
        let candles = self.get_ohlcv(request).await?;
        MovingAverageSignal::compute(request, &candles, short, long)
    }

    #[instrument(skip(self), fields(symbol = %request.symbol(), exchange = %request.exchange()))]
    pub async fn get_volume_analysis(
        &self,
        request: &HistoricalDataRequest,
    ) -> GatewayResult<VolumeAnalysis> {
        let candles = self.get_ohlcv(request).await?;
        VolumeAnalysis::compute(request, &candles)
    }

    // ========================================================================
    // Exchange metadata
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn get_exchange_info(&self, exchange: Exchange) -> GatewayResult<ExchangeInfo> {
        let handle = self.registry.get_handle(exchange)?;
        let catalog = handle
            .ensure_markets_loaded()
            .await
            .map_err(|e| GatewayError::fetch("exchange info", exchange.id(), e))?;

        let connector = handle.connector();
        Ok(ExchangeInfo::new(
            connector.describe(),
            catalog.len(),
            connector.pacing(),
        ))
    }

    /// Symbols containing `query`, ascending, at most [`SYMBOL_SEARCH_LIMIT`]
    #[instrument(skip(self))]
    pub async fn search_symbols(
        &self,
        query: &str,
        exchange: Exchange,
    ) -> GatewayResult<Vec<String>> {
        let catalog = self.registry.ensure_markets_loaded(exchange).await?;
        let matches = catalog.search(query.trim(), SYMBOL_SEARCH_LIMIT);
        debug!("{} symbols on {} match '{}'", matches.len(), exchange, query);
        Ok(matches)
    }

    // ========================================================================
    // Status & maintenance
    // ========================================================================

    pub fn server_status(&self) -> ServerStatus {
        let total_requests = self.metrics.requests();
        let total_errors = self.metrics.errors();

        ServerStatus {
            status: "running",
            uptime_seconds: self.started_at.elapsed().as_secs(),
            total_requests,
            total_errors,
            error_rate: total_errors as f64 / total_requests.max(1) as f64,
            cache_stats: self.cache.stats(),
            supported_exchanges: Exchange::ALL.to_vec(),
            available_exchanges: self.registry.available(),
            supported_timeframes: Timeframe::ALL.to_vec(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear_all();
    }

    pub fn reset_counters(&self) {
        self.metrics.reset();
        info!("Request counters reset");
    }
}
