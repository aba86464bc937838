//! Binance spot public API connector

use async_trait::async_trait;
use gateway_core::{Exchange, Timeframe, UpstreamError};
use serde_json::Value;
use tracing::instrument;

use crate::connector::{ConnectorConfig, ExchangeConnector};
use crate::rate_limiter::RateLimiterStats;
use crate::rest::{self, RestClient};
use crate::types::{
    Capabilities, ExchangeDescription, MarketCatalog, MarketInfo, RawCandle, RawOrderBook,
    RawTicker,
};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_MS: u64 = 50;
const DEPTH_LIMITS: [usize; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];

/// Binance connector
#[derive(Debug, Clone)]
pub struct BinanceConnector {
    rest: RestClient,
}

impl BinanceConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            rest: RestClient::new(Exchange::Binance, BINANCE_API_BASE, RATE_LIMIT_MS, config)?,
        })
    }
}

/// "BTC/USDT" -> "BTCUSDT"
pub fn market_id(symbol: &str) -> String {
    symbol.replace('/', "")
}

fn parse_markets(body: &Value) -> Result<MarketCatalog, UpstreamError> {
    let symbols = rest::array(&body["symbols"], "symbols")?;

    Ok(symbols
        .iter()
        .filter_map(|s| {
            let id = s["symbol"].as_str()?;
            let base = s["baseAsset"].as_str()?;
            let quote = s["quoteAsset"].as_str()?;
            let active = s["status"].as_str() == Some("TRADING");
            Some(MarketInfo::new(id, base, quote, active))
        })
        .collect())
}

fn parse_ticker(body: &Value) -> Result<RawTicker, UpstreamError> {
    Ok(RawTicker {
        timestamp_ms: body["closeTime"].as_i64(),
        last: rest::opt_decimal(body.get("lastPrice")),
        bid: rest::opt_decimal(body.get("bidPrice")),
        ask: rest::opt_decimal(body.get("askPrice")),
        high: rest::opt_decimal(body.get("highPrice")),
        low: rest::opt_decimal(body.get("lowPrice")),
        base_volume: rest::opt_decimal(body.get("volume")),
        percentage: rest::opt_decimal(body.get("priceChangePercent")),
    })
}

fn parse_order_book(body: &Value) -> Result<RawOrderBook, UpstreamError> {
    Ok(RawOrderBook {
        timestamp_ms: body["T"].as_i64(),
        bids: rest::levels(&body["bids"], "bids")?,
        asks: rest::levels(&body["asks"], "asks")?,
    })
}

fn parse_klines(body: &Value) -> Result<Vec<RawCandle>, UpstreamError> {
    rest::array(body, "klines")?
        .iter()
        .map(|row| {
            let row = rest::array(row, "kline")?;
            Ok(RawCandle {
                timestamp_ms: rest::integer(rest::at(row, 0, "open_time")?, "open_time")?,
                open: rest::decimal(rest::at(row, 1, "open")?, "open")?,
                high: rest::decimal(rest::at(row, 2, "high")?, "high")?,
                low: rest::decimal(rest::at(row, 3, "low")?, "low")?,
                close: rest::decimal(rest::at(row, 4, "close")?, "close")?,
                volume: rest::decimal(rest::at(row, 5, "volume")?, "volume")?,
            })
        })
        .collect()
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn pacing(&self) -> Option<RateLimiterStats> {
        self.rest.pacing()
    }

    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: Exchange::Binance,
            name: Exchange::Binance.display_name(),
            countries: vec!["JP", "MT"],
            has: Capabilities {
                ticker: true,
                ohlcv: true,
                orderbook: true,
                trades: false,
            },
            timeframes: Timeframe::ALL.to_vec(),
            rate_limit_ms: RATE_LIMIT_MS,
        }
    }

    #[instrument(skip(self))]
    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError> {
        let body = self.rest.get_json("/api/v3/exchangeInfo", &[]).await?;
        parse_markets(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError> {
        let body = self
            .rest
            .get_json("/api/v3/ticker/24hr", &[("symbol", market_id(symbol))])
            .await?;
        parse_ticker(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        let depth = rest::depth_bucket(limit, &DEPTH_LIMITS);
        let body = self
            .rest
            .get_json(
                "/api/v3/depth",
                &[("symbol", market_id(symbol)), ("limit", depth.to_string())],
            )
            .await?;
        parse_order_book(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        let mut query = vec![
            ("symbol", market_id(symbol)),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(since) = since {
            query.push(("startTime", since.to_string()));
        }

        let body = self.rest.get_json("/api/v3/klines", &query).await?;
        parse_klines(&body)
    }
}
