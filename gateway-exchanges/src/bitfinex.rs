//! Bitfinex public v2 API connector
//!
//! Bitfinex answers with positional arrays rather than objects, and spells
//! tether `UST`.

use async_trait::async_trait;
use chrono::Utc;
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

const BITFINEX_API_BASE: &str = "https://api-pub.bitfinex.com";
const RATE_LIMIT_MS: u64 = 250;
const BOOK_LENGTHS: [usize; 3] = [1, 25, 100];

#[derive(Debug, Clone)]
pub struct BitfinexConnector {
    rest: RestClient,
}

impl BitfinexConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            rest: RestClient::new(Exchange::Bitfinex, BITFINEX_API_BASE, RATE_LIMIT_MS, config)?,
        })
    }
}

fn to_bitfinex_asset(asset: &str) -> &str {
    if asset == "USDT" {
        "UST"
    } else {
        asset
    }
}

fn from_bitfinex_asset(asset: &str) -> &str {
    if asset == "UST" {
        "USDT"
    } else {
        asset
    }
}

/// "BTC/USD" -> "tBTCUSD", "DOGE/USD" -> "tDOGE:USD"
pub fn trading_symbol(symbol: &str) -> String {
    let Some((base, quote)) = symbol.split_once('/') else {
        return format!("t{}", symbol);
    };
    let base = to_bitfinex_asset(base);
    let quote = to_bitfinex_asset(quote);
    if base.len() > 3 || quote.len() > 3 {
        format!("t{}:{}", base, quote)
    } else {
        format!("t{}{}", base, quote)
    }
}

/// Split a listed pair such as "BTCUST" or "DOGE:USD"
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    if let Some(split) = pair.split_once(':') {
        return Some(split);
    }
    (pair.len() == 6 && pair.is_ascii()).then(|| pair.split_at(3))
}

fn timeframe_code(timeframe: Timeframe) -> Option<&'static str> {
    match timeframe {
        Timeframe::OneMinute => Some("1m"),
        Timeframe::FiveMinutes => Some("5m"),
        Timeframe::FifteenMinutes => Some("15m"),
        Timeframe::ThirtyMinutes => Some("30m"),
        Timeframe::OneHour => Some("1h"),
        Timeframe::OneDay => Some("1D"),
        Timeframe::OneWeek => Some("1W"),
        Timeframe::OneMonth => Some("1M"),
        Timeframe::FourHours => None,
    }
}

/// Body is `[[pair, pair, ...]]`
fn parse_pairs(body: &Value) -> Result<MarketCatalog, UpstreamError> {
    let outer = rest::array(body, "pairs")?;
    let pairs = match outer.first() {
        Some(inner) => rest::array(inner, "pairs")?,
        None => return Ok(MarketCatalog::default()),
    };

    Ok(pairs
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|pair| {
            let (base, quote) = split_pair(pair)?;
            Some(MarketInfo::new(
                format!("t{}", pair),
                from_bitfinex_asset(base),
                from_bitfinex_asset(quote),
                true,
            ))
        })
        .collect())
}

/// `[BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]`
fn parse_ticker(body: &Value) -> Result<RawTicker, UpstreamError> {
    let row = rest::array(body, "ticker")?;
    if row.len() < 10 {
        return Err(UpstreamError::exchange(format!(
            "Bitfinex ticker has {} fields, expected 10",
            row.len()
        )));
    }

    Ok(RawTicker {
        timestamp_ms: None,
        bid: rest::opt_decimal(row.first()),
        ask: rest::opt_decimal(row.get(2)),
        percentage: rest::opt_decimal(row.get(5)).map(|rel| rel * rust_decimal::Decimal::ONE_HUNDRED),
        last: rest::opt_decimal(row.get(6)),
        base_volume: rest::opt_decimal(row.get(7)),
        high: rest::opt_decimal(row.get(8)),
        low: rest::opt_decimal(row.get(9)),
    })
}

/// Rows are `[price, count, amount]`; positive amounts are bids, negative are asks
fn parse_book(body: &Value) -> Result<RawOrderBook, UpstreamError> {
    let mut book = RawOrderBook::default();

    for row in rest::array(body, "book")? {
        let row = rest::array(row, "book")?;
        let price = rest::decimal(rest::at(row, 0, "price")?, "price")?;
        let amount = rest::decimal(rest::at(row, 2, "amount")?, "amount")?;

        if amount.is_sign_positive() {
            book.bids.push((price, amount));
        } else {
            book.asks.push((price, amount.abs()));
        }
    }

    Ok(book)
}

/// Rows are `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`
fn parse_candles(body: &Value) -> Result<Vec<RawCandle>, UpstreamError> {
    let mut candles = rest::array(body, "candles")?
        .iter()
        .map(|row| {
            let row = rest::array(row, "candle")?;
            Ok(RawCandle {
                timestamp_ms: rest::integer(rest::at(row, 0, "mts")?, "mts")?,
                open: rest::decimal(rest::at(row, 1, "open")?, "open")?,
                close: rest::decimal(rest::at(row, 2, "close")?, "close")?,
                high: rest::decimal(rest::at(row, 3, "high")?, "high")?,
                low: rest::decimal(rest::at(row, 4, "low")?, "low")?,
                volume: rest::decimal(rest::at(row, 5, "volume")?, "volume")?,
            })
        })
        .collect::<Result<Vec<_>, UpstreamError>>()?;

    candles.sort_by_key(|c| c.timestamp_ms);
    Ok(candles)
}

#[async_trait]
impl ExchangeConnector for BitfinexConnector {
    fn pacing(&self) -> Option<RateLimiterStats> {
        self.rest.pacing()
    }

    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: Exchange::Bitfinex,
            name: Exchange::Bitfinex.display_name(),
            countries: vec!["VG"],
            has: Capabilities {
                ticker: true,
                ohlcv: true,
                orderbook: true,
                trades: false,
            },
            timeframes: Timeframe::ALL
                .iter()
                .copied()
                .filter(|tf| timeframe_code(*tf).is_some())
                .collect(),
            rate_limit_ms: RATE_LIMIT_MS,
        }
    }

    #[instrument(skip(self))]
    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError> {
        let body = self
            .rest
            .get_json("/v2/conf/pub:list:pair:exchange", &[])
            .await?;
        parse_pairs(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError> {
        let path = format!("/v2/ticker/{}", trading_symbol(symbol));
        let body = self.rest.get_json(&path, &[]).await?;
        parse_ticker(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        let len = rest::depth_bucket(limit, &BOOK_LENGTHS);
        let path = format!("/v2/book/{}/P0", trading_symbol(symbol));
        let body = self.rest.get_json(&path, &[("len", len.to_string())]).await?;
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
        let code = timeframe_code(timeframe).ok_or_else(|| {
            UpstreamError::exchange(format!("Bitfinex does not support timeframe {}", timeframe))
        })?;

        let start = since.unwrap_or_else(|| {
            Utc::now().timestamp_millis() - i64::from(limit) * timeframe.to_seconds() as i64 * 1000
        });

        let path = format!("/v2/candles/trade:{}:{}/hist", code, trading_symbol(symbol));
        let body = self
            .rest
            .get_json(
                &path,
                &[
                    ("limit", limit.to_string()),
                    ("sort", "1".to_string()),
                    ("start", start.to_string()),
                ],
            )
            .await?;
        parse_candles(&body)
    }
}
