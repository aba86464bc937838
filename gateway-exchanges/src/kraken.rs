//! Kraken public REST connector
//!
//! Kraken uses its own asset codes (`XBT` for bitcoin, `XDG` for dogecoin)
//! and wraps every payload in `{"error": [...], "result": {...}}`.

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

const KRAKEN_API_BASE: &str = "https://api.kraken.com";
const RATE_LIMIT_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct KrakenConnector {
    rest: RestClient,
}

impl KrakenConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            rest: RestClient::new(Exchange::Kraken, KRAKEN_API_BASE, RATE_LIMIT_MS, config)?,
        })
    }

    async fn public(&self, method: &str, query: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let body = self
            .rest
            .get_json(&format!("/0/public/{}", method), query)
            .await?;
        unwrap_result(body)
    }
}

fn to_kraken_asset(asset: &str) -> &str {
    match asset {
        "BTC" => "XBT",
        "DOGE" => "XDG",
        other => other,
    }
}

fn from_kraken_asset(asset: &str) -> &str {
    match asset {
        "XBT" => "BTC",
        "XDG" => "DOGE",
        other => other,
    }
}

/// "BTC/USD" -> "XBTUSD"
pub fn pair_id(symbol: &str) -> String {
    match symbol.split_once('/') {
        Some((base, quote)) => format!("{}{}", to_kraken_asset(base), to_kraken_asset(quote)),
        None => symbol.to_string(),
    }
}

fn unwrap_result(mut body: Value) -> Result<Value, UpstreamError> {
    if let Some(errors) = body["error"].as_array() {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors.iter().filter_map(Value::as_str).collect();
            return Err(UpstreamError::exchange(format!(
                "Kraken API error: {}",
                messages.join(", ")
            )));
        }
    }
    Ok(body["result"].take())
}

/// Kraken keys results by its own pair name, which may differ from the request
fn first_entry(result: &Value) -> Result<&Value, UpstreamError> {
    result
        .as_object()
        .and_then(|map| {
            map.iter()
                .find(|(key, _)| key.as_str() != "last")
                .map(|(_, value)| value)
        })
        .ok_or_else(|| UpstreamError::exchange("Kraken returned an empty result"))
}

fn nth_decimal(value: &Value, field: &str, index: usize) -> Option<rust_decimal::Decimal> {
    rest::opt_decimal(value.get(field).and_then(|v| v.get(index)))
}

fn parse_asset_pairs(result: &Value) -> MarketCatalog {
    let Some(pairs) = result.as_object() else {
        return MarketCatalog::default();
    };

    pairs
        .iter()
        .filter_map(|(key, pair)| {
            let (base, quote) = pair["wsname"].as_str()?.split_once('/')?;
            let id = pair["altname"].as_str().unwrap_or(key);
            let active = pair["status"].as_str().map_or(true, |s| s == "online");
            Some(MarketInfo::new(
                id,
                from_kraken_asset(base),
                from_kraken_asset(quote),
                active,
            ))
        })
        .collect()
}

fn parse_ticker(result: &Value) -> Result<RawTicker, UpstreamError> {
    let t = first_entry(result)?;
    let last = nth_decimal(t, "c", 0);
    Ok(RawTicker {
        timestamp_ms: None,
        last,
        bid: nth_decimal(t, "b", 0),
        ask: nth_decimal(t, "a", 0),
        high: nth_decimal(t, "h", 1),
        low: nth_decimal(t, "l", 1),
        base_volume: nth_decimal(t, "v", 1),
        percentage: rest::percent_change(rest::opt_decimal(t.get("o")), last),
    })
}

fn parse_depth(result: &Value) -> Result<RawOrderBook, UpstreamError> {
    let book = first_entry(result)?;
    Ok(RawOrderBook {
        timestamp_ms: None,
        bids: rest::levels(&book["bids"], "bids")?,
        asks: rest::levels(&book["asks"], "asks")?,
    })
}

/// Rows are `[time_s, open, high, low, close, vwap, volume, count]`
///
/// Kraken answers with everything after `since` (up to 720 rows), so a
/// windowed request keeps the first `limit` candles and an open-ended one
/// keeps the newest.
fn parse_ohlc(
    result: &Value,
    since: Option<i64>,
    limit: u32,
) -> Result<Vec<RawCandle>, UpstreamError> {
    let mut candles = rest::array(first_entry(result)?, "ohlc")?
        .iter()
        .map(|row| {
            let row = rest::array(row, "ohlc")?;
            Ok(RawCandle {
                timestamp_ms: rest::seconds_as_millis(rest::at(row, 0, "time")?, "time")?,
                open: rest::decimal(rest::at(row, 1, "open")?, "open")?,
                high: rest::decimal(rest::at(row, 2, "high")?, "high")?,
                low: rest::decimal(rest::at(row, 3, "low")?, "low")?,
                close: rest::decimal(rest::at(row, 4, "close")?, "close")?,
                volume: rest::decimal(rest::at(row, 6, "volume")?, "volume")?,
            })
        })
        .collect::<Result<Vec<_>, UpstreamError>>()?;

    match since {
        Some(since) => {
            candles.retain(|c| c.timestamp_ms >= since);
            candles.truncate(limit as usize);
            Ok(candles)
        }
        None => Ok(rest::keep_newest(candles, limit)),
    }
}

/// OHLC interval in minutes
fn interval_minutes(timeframe: Timeframe) -> Option<u32> {
    match timeframe {
        Timeframe::OneMinute => Some(1),
        Timeframe::FiveMinutes => Some(5),
        Timeframe::FifteenMinutes => Some(15),
        Timeframe::ThirtyMinutes => Some(30),
        Timeframe::OneHour => Some(60),
        Timeframe::FourHours => Some(240),
        Timeframe::OneDay => Some(1440),
        Timeframe::OneWeek => Some(10080),
        Timeframe::OneMonth => None,
    }
}

#[async_trait]
impl ExchangeConnector for KrakenConnector {
    fn pacing(&self) -> Option<RateLimiterStats> {
        self.rest.pacing()
    }

    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: Exchange::Kraken,
            name: Exchange::Kraken.display_name(),
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
                .filter(|tf| interval_minutes(*tf).is_some())
                .collect(),
            rate_limit_ms: RATE_LIMIT_MS,
        }
    }

    #[instrument(skip(self))]
    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError> {
        let result = self.public("AssetPairs", &[]).await?;
        Ok(parse_asset_pairs(&result))
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError> {
        let result = self.public("Ticker", &[("pair", pair_id(symbol))]).await?;
        parse_ticker(&result)
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        let result = self
            .public(
                "Depth",
                &[("pair", pair_id(symbol)), ("count", limit.min(500).to_string())],
            )
            .await?;
        parse_depth(&result)
    }

    #[instrument(skip(self))]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        let interval = interval_minutes(timeframe).ok_or_else(|| {
            UpstreamError::exchange(format!("Kraken does not support timeframe {}", timeframe))
        })?;

        let mut query = vec![("pair", pair_id(symbol)), ("interval", interval.to_string())];
        if let Some(since) = since {
            query.push(("since", (since / 1000).to_string()));
        }

        let result = self.public("OHLC", &query).await?;
        parse_ohlc(&result, since, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_pair_id_uses_kraken_asset_codes() {
        assert_eq!(pair_id("BTC/USD"), "XBTUSD");
        assert_eq!(pair_id("DOGE/EUR"), "XDGEUR");
        assert_eq!(pair_id("ETH/USDT"), "ETHUSDT");
    }

    #[test]
    fn test_error_envelope_is_exchange_fault() {
        let body = json!({"error": ["EQuery:Unknown asset pair"], "result": {}});
        let err = unwrap_result(body).unwrap_err();
        assert!(matches!(err, UpstreamError::Exchange(ref msg) if msg.contains("Unknown asset pair")));
    }

    #[test]
    fn test_parse_ticker() {
        let result = json!({
            "XXBTZUSD": {
                "a": ["50001.0", "1", "1.000"],
                "b": ["49999.0", "2", "2.000"],
                "c": ["50000.0", "0.1"],
                "v": ["100.0", "1234.5"],
                "h": ["50500.0", "51000.0"],
                "l": ["49500.0", "49000.0"],
                "o": "48000.0"
            }
        });

        let raw = parse_ticker(&result).unwrap();
        assert_eq!(raw.last, Some(dec!(50000)));
        assert_eq!(raw.bid, Some(dec!(49999)));
        assert_eq!(raw.ask, Some(dec!(50001)));
        assert_eq!(raw.high, Some(dec!(51000)));
        assert_eq!(raw.low, Some(dec!(49000)));
        assert_eq!(raw.base_volume, Some(dec!(1234.5)));
        assert!(raw.percentage.is_some());
    }

    #[test]
    fn test_parse_ohlc_skips_last_cursor() {
        let result = json!({
            "XXBTZUSD": [
                [1_700_000_000i64, "1", "3", "0.5", "2", "1.8", "10", 5],
                [1_700_000_060i64, "2", "4", "1.5", "3", "2.8", "20", 7]
            ],
            "last": 1_700_000_060i64
        });

        let candles = parse_ohlc(&result, None, 100).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(candles[1].volume, dec!(20));
    }

    #[test]
    fn test_parse_ohlc_window_starts_at_since() {
        let rows: Vec<Value> = (0..4)
            .map(|i| json!([1_000 + i * 60, "1", "1", "1", "1", "1", "1", 1]))
            .collect();
        let result = json!({"XXBTZUSD": rows, "last": 1_180});

        let windowed = parse_ohlc(&result, Some(1_000_000), 2).unwrap();
        let times: Vec<i64> = windowed.iter().map(|c| c.timestamp_ms).collect();
        assert_eq!(times, vec![1_000_000, 1_060_000]);

        let latest = parse_ohlc(&result, None, 2).unwrap();
        let times: Vec<i64> = latest.iter().map(|c| c.timestamp_ms).collect();
        assert_eq!(times, vec![1_120_000, 1_180_000]);
    }

    #[test]
    fn test_parse_asset_pairs_translates_asset_codes() {
        let result = json!({
            "XXBTZUSD": {"altname": "XBTUSD", "wsname": "XBT/USD", "status": "online"},
            "XDGEUR": {"altname": "XDGEUR", "wsname": "XDG/EUR"},
            "ODDPAIR.d": {"altname": "ODD"}
        });

        let catalog = parse_asset_pairs(&result);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("BTC/USD").map(|m| m.id.as_str()), Some("XBTUSD"));
        assert!(catalog.get("DOGE/EUR").is_some());
    }
}
