//! Huobi (HTX) public market API connector

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

const HUOBI_API_BASE: &str = "https://api.huobi.pro";
const RATE_LIMIT_MS: u64 = 100;
const DEPTH_LEVELS: [usize; 3] = [5, 10, 20];

#[derive(Debug, Clone)]
pub struct HuobiConnector {
    rest: RestClient,
}

impl HuobiConnector {
    pub fn new(config: &ConnectorConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            rest: RestClient::new(Exchange::Huobi, HUOBI_API_BASE, RATE_LIMIT_MS, config)?,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, UpstreamError> {
        let body = self.rest.get_json(path, query).await?;
        check_status(body)
    }
}

/// "BTC/USDT" -> "btcusdt"
pub fn market_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_lowercase()
}

fn check_status(body: Value) -> Result<Value, UpstreamError> {
    if body["status"].as_str() == Some("error") {
        let message = body["err-msg"]
            .as_str()
            .or_else(|| body["err-code"].as_str())
            .unwrap_or("unknown error");
        return Err(UpstreamError::exchange(format!("Huobi API error: {}", message)));
    }
    Ok(body)
}

fn period(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1min",
        Timeframe::FiveMinutes => "5min",
        Timeframe::FifteenMinutes => "15min",
        Timeframe::ThirtyMinutes => "30min",
        Timeframe::OneHour => "60min",
        Timeframe::FourHours => "4hour",
        Timeframe::OneDay => "1day",
        Timeframe::OneWeek => "1week",
        Timeframe::OneMonth => "1mon",
    }
}

fn parse_symbols(body: &Value) -> Result<MarketCatalog, UpstreamError> {
    Ok(rest::array(&body["data"], "data")?
        .iter()
        .filter_map(|s| {
            let id = s["symbol"].as_str()?;
            let base = s["base-currency"].as_str()?;
            let quote = s["quote-currency"].as_str()?;
            let active = s["state"].as_str() == Some("online");
            Some(MarketInfo::new(id, base, quote, active))
        })
        .collect())
}

fn parse_merged(body: &Value) -> RawTicker {
    let tick = &body["tick"];
    let last = rest::opt_decimal(tick.get("close"));
    RawTicker {
        timestamp_ms: body["ts"].as_i64(),
        last,
        bid: rest::opt_decimal(tick.get("bid").and_then(|b| b.get(0))),
        ask: rest::opt_decimal(tick.get("ask").and_then(|a| a.get(0))),
        high: rest::opt_decimal(tick.get("high")),
        low: rest::opt_decimal(tick.get("low")),
        base_volume: rest::opt_decimal(tick.get("amount")),
        percentage: rest::percent_change(rest::opt_decimal(tick.get("open")), last),
    }
}

fn parse_depth(body: &Value) -> Result<RawOrderBook, UpstreamError> {
    let tick = &body["tick"];
    Ok(RawOrderBook {
        timestamp_ms: body["ts"].as_i64(),
        bids: rest::levels(&tick["bids"], "bids")?,
        asks: rest::levels(&tick["asks"], "asks")?,
    })
}

/// `data` is newest first; `id` is the candle open time in seconds
fn parse_klines(body: &Value, since: Option<i64>) -> Result<Vec<RawCandle>, UpstreamError> {
    let mut candles = rest::array(&body["data"], "data")?
        .iter()
        .map(|k| {
            Ok(RawCandle {
                timestamp_ms: rest::seconds_as_millis(&k["id"], "id")?,
                open: rest::decimal(&k["open"], "open")?,
                high: rest::decimal(&k["high"], "high")?,
                low: rest::decimal(&k["low"], "low")?,
                close: rest::decimal(&k["close"], "close")?,
                volume: rest::decimal(&k["amount"], "amount")?,
            })
        })
        .collect::<Result<Vec<_>, UpstreamError>>()?;

    candles.reverse();
    if let Some(since) = since {
        candles.retain(|c| c.timestamp_ms >= since);
    }
    Ok(candles)
}

#[async_trait]
impl ExchangeConnector for HuobiConnector {
    fn pacing(&self) -> Option<RateLimiterStats> {
        self.rest.pacing()
    }

    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: Exchange::Huobi,
            name: Exchange::Huobi.display_name(),
            countries: vec!["CN"],
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
        let body = self.get("/v1/common/symbols", &[]).await?;
        parse_symbols(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError> {
        let body = self
            .get("/market/detail/merged", &[("symbol", market_symbol(symbol))])
            .await?;
        Ok(parse_merged(&body))
    }

    #[instrument(skip(self))]
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        let mut query = vec![
            ("symbol", market_symbol(symbol)),
            ("type", "step0".to_string()),
        ];
        // Without `depth` Huobi returns its full 150-level snapshot
        if limit <= 20 {
            query.push(("depth", rest::depth_bucket(limit, &DEPTH_LEVELS).to_string()));
        }

        let body = self.get("/market/depth", &query).await?;
        parse_depth(&body)
    }

    /// Huobi has no start-time parameter: this fetches the newest `limit`
    /// candles and drops those before `since`, so an older `since` yields a
    /// shorter series that starts after it.
    #[instrument(skip(self))]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        let body = self
            .get(
                "/market/history/kline",
                &[
                    ("symbol", market_symbol(symbol)),
                    ("period", period(timeframe).to_string()),
                    ("size", limit.min(2000).to_string()),
                ],
            )
            .await?;
        parse_klines(&body, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_market_symbol_is_lowercase() {
        assert_eq!(market_symbol("BTC/USDT"), "btcusdt");
    }

    #[test]
    fn test_error_status_is_exchange_fault() {
        let body = json!({"status": "error", "err-code": "invalid-parameter", "err-msg": "invalid symbol"});
        assert_eq!(
            check_status(body).unwrap_err(),
            UpstreamError::Exchange("Huobi API error: invalid symbol".to_string())
        );
    }

    #[test]
    fn test_parse_merged() {
        let body = json!({
            "status": "ok",
            "ts": 1_700_000_000_000i64,
            "tick": {
                "open": 100.0, "close": 104.0, "high": 105.0, "low": 99.0,
                "amount": 321.5, "bid": [103.9, 1.2], "ask": [104.1, 0.8]
            }
        });

        let raw = parse_merged(&body);
        assert_eq!(raw.last, Some(dec!(104)));
        assert_eq!(raw.bid, Some(dec!(103.9)));
        assert_eq!(raw.ask, Some(dec!(104.1)));
        assert_eq!(raw.base_volume, Some(dec!(321.5)));
        assert_eq!(raw.percentage, Some(dec!(4)));
        assert_eq!(raw.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_parse_klines_oldest_first_and_filtered_by_since() {
        let body = json!({
            "status": "ok",
            "data": [
                {"id": 1_700_000_120i64, "open": 3, "close": 4, "low": 2, "high": 5, "amount": 30},
                {"id": 1_700_000_060i64, "open": 2, "close": 3, "low": 1, "high": 4, "amount": 20},
                {"id": 1_700_000_000i64, "open": 1, "close": 2, "low": 0.5, "high": 3, "amount": 10}
            ]
        });

        let all = parse_klines(&body, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(all[2].close, dec!(4));

        let recent = parse_klines(&body, Some(1_700_000_060_000)).unwrap();
        assert_eq!(recent.len(), 2);
    }
}
