//! Coinbase Exchange public API connector

use async_trait::async_trait;
use chrono::{DateTime, Utc};
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

const COINBASE_API_BASE: &str = "https://api.exchange.coinbase.com";
const RATE_LIMIT_MS: u64 = 100;

/// Coinbase returns at most 300 candles per request
const MAX_CANDLES: u32 = 300;

#[derive(Debug, Clone)]
pub struct CoinbaseConnector {
    rest: RestClient,
}

impl CoinbaseConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            rest: RestClient::new(Exchange::Coinbase, COINBASE_API_BASE, RATE_LIMIT_MS, config)?,
        })
    }
}

/// "BTC/USD" -> "BTC-USD"
pub fn product_id(symbol: &str) -> String {
    symbol.replace('/', "-")
}

/// Candle granularity in seconds; Coinbase only serves a fixed set
fn granularity(timeframe: Timeframe) -> Option<i64> {
    match timeframe {
        Timeframe::OneMinute => Some(60),
        Timeframe::FiveMinutes => Some(300),
        Timeframe::FifteenMinutes => Some(900),
        Timeframe::OneHour => Some(3600),
        Timeframe::OneDay => Some(86400),
        _ => None,
    }
}

fn parse_products(body: &Value) -> Result<MarketCatalog, UpstreamError> {
    Ok(rest::array(body, "products")?
        .iter()
        .filter_map(|p| {
            let id = p["id"].as_str()?;
            let base = p["base_currency"].as_str()?;
            let quote = p["quote_currency"].as_str()?;
            let active = p["status"].as_str() == Some("online")
                && !p["trading_disabled"].as_bool().unwrap_or(false);
            Some(MarketInfo::new(id, base, quote, active))
        })
        .collect())
}

/// Combine `/ticker` and `/stats`; the 24h change is measured from the stats open
fn parse_ticker(ticker: &Value, stats: &Value) -> RawTicker {
    let last = rest::opt_decimal(ticker.get("price"));
    RawTicker {
        timestamp_ms: rest::rfc3339_millis(ticker.get("time")),
        last,
        bid: rest::opt_decimal(ticker.get("bid")),
        ask: rest::opt_decimal(ticker.get("ask")),
        high: rest::opt_decimal(stats.get("high")),
        low: rest::opt_decimal(stats.get("low")),
        base_volume: rest::opt_decimal(ticker.get("volume"))
            .or_else(|| rest::opt_decimal(stats.get("volume"))),
        percentage: rest::percent_change(rest::opt_decimal(stats.get("open")), last),
    }
}

fn parse_book(body: &Value) -> Result<RawOrderBook, UpstreamError> {
    Ok(RawOrderBook {
        timestamp_ms: rest::rfc3339_millis(body.get("time")),
        bids: rest::levels(&body["bids"], "bids")?,
        asks: rest::levels(&body["asks"], "asks")?,
    })
}

/// Rows are `[time_s, low, high, open, close, volume]`, newest first
fn parse_candles(body: &Value, limit: u32) -> Result<Vec<RawCandle>, UpstreamError> {
    let mut candles = rest::array(body, "candles")?
        .iter()
        .map(|row| {
            let row = rest::array(row, "candle")?;
            Ok(RawCandle {
                timestamp_ms: rest::seconds_as_millis(rest::at(row, 0, "time")?, "time")?,
                low: rest::decimal(rest::at(row, 1, "low")?, "low")?,
                high: rest::decimal(rest::at(row, 2, "high")?, "high")?,
                open: rest::decimal(rest::at(row, 3, "open")?, "open")?,
                close: rest::decimal(rest::at(row, 4, "close")?, "close")?,
                volume: rest::decimal(rest::at(row, 5, "volume")?, "volume")?,
            })
        })
        .collect::<Result<Vec<_>, UpstreamError>>()?;

    candles.sort_by_key(|c| c.timestamp_ms);
    Ok(rest::keep_newest(candles, limit))
}

fn rfc3339(epoch_ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms).map(|dt| dt.to_rfc3339())
}

#[async_trait]
impl ExchangeConnector for CoinbaseConnector {
    fn pacing(&self) -> Option<RateLimiterStats> {
        self.rest.pacing()
    }

    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: Exchange::Coinbase,
            name: Exchange::Coinbase.display_name(),
            countries: vec!["US"],
            has: Capabilities {
                ticker: true,
                ohlcv: true,
                orderbook: true,
                trades: false,
            },
            timeframes: Timeframe::ALL
                .iter()
                .copied()
                .filter(|tf| granularity(*tf).is_some())
                .collect(),
            rate_limit_ms: RATE_LIMIT_MS,
        }
    }

    #[instrument(skip(self))]
    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError> {
        let body = self.rest.get_json("/products", &[]).await?;
        parse_products(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError> {
        let id = product_id(symbol);
        let ticker_path = format!("/products/{}/ticker", id);
        let stats_path = format!("/products/{}/stats", id);

        let (ticker, stats) = tokio::join!(
            self.rest.get_json(&ticker_path, &[]),
            self.rest.get_json(&stats_path, &[]),
        );

        Ok(parse_ticker(&ticker?, &stats?))
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(
        &self,
        symbol: &str,
        _limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        // Level 2 is the aggregated top 50 per side; there is no depth parameter
        let path = format!("/products/{}/book", product_id(symbol));
        let body = self.rest.get_json(&path, &[("level", "2".to_string())]).await?;
        parse_book(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        let granularity = granularity(timeframe).ok_or_else(|| {
            UpstreamError::exchange(format!("Coinbase does not support timeframe {}", timeframe))
        })?;

        let mut query = vec![("granularity", granularity.to_string())];
        if let Some(since) = since {
            let span = i64::from(limit.min(MAX_CANDLES)) * granularity * 1000;
            if let (Some(start), Some(end)) = (rfc3339(since), rfc3339(since + span)) {
                query.push(("start", start));
                query.push(("end", end));
            }
        }

        let path = format!("/products/{}/candles", product_id(symbol));
        let body = self.rest.get_json(&path, &query).await?;
        parse_candles(&body, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_product_id() {
        assert_eq!(product_id("ETH/USD"), "ETH-USD");
    }

    #[test]
    fn test_granularity_only_covers_native_timeframes() {
        assert_eq!(granularity(Timeframe::OneHour), Some(3600));
        assert_eq!(granularity(Timeframe::FourHours), None);
        assert_eq!(granularity(Timeframe::OneWeek), None);
    }

    #[test]
    fn test_parse_ticker_merges_stats() {
        let ticker = json!({
            "trade_id": 4729088,
            "price": "104.00",
            "size": "0.193",
            "bid": "103.99",
            "ask": "104.01",
            "volume": "5957.11914015",
            "time": "2024-01-01T00:00:00.000Z"
        });
        let stats = json!({"open": "100", "high": "110", "low": "95", "volume": "6000"});

        let raw = parse_ticker(&ticker, &stats);
        assert_eq!(raw.last, Some(dec!(104)));
        assert_eq!(raw.high, Some(dec!(110)));
        assert_eq!(raw.low, Some(dec!(95)));
        assert_eq!(raw.base_volume, Some(dec!(5957.11914015)));
        assert_eq!(raw.percentage, Some(dec!(4)));
        assert_eq!(raw.timestamp_ms, Some(1_704_067_200_000));
    }

    #[test]
    fn test_parse_candles_reorders_oldest_first_and_trims() {
        let body = json!([
            [1_700_000_120i64, 9, 12, 10, 11, 3.5],
            [1_700_000_060i64, 8, 11, 9, 10, 2.5],
            [1_700_000_000i64, 7, 10, 8, 9, 1.5]
        ]);

        let candles = parse_candles(&body, 2).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp_ms, 1_700_000_060_000);
        assert_eq!(candles[1].timestamp_ms, 1_700_000_120_000);
        assert_eq!(candles[1].open, dec!(10));
        assert_eq!(candles[1].low, dec!(9));
        assert_eq!(candles[1].high, dec!(12));
    }

    #[test]
    fn test_parse_products_marks_disabled_inactive() {
        let body = json!([
            {"id": "BTC-USD", "base_currency": "BTC", "quote_currency": "USD", "status": "online"},
            {"id": "XYZ-USD", "base_currency": "XYZ", "quote_currency": "USD", "status": "delisted"}
        ]);

        let catalog = parse_products(&body).unwrap();
        assert!(catalog.get("BTC/USD").unwrap().active);
        assert!(!catalog.get("XYZ/USD").unwrap().active);
    }
}
