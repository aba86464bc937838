//! Validated request models
//!
//! Requests are validated and normalized when they are built, so the
//! engine never sees a malformed symbol or an out-of-range limit.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::exchange::Exchange;
use crate::timeframe::Timeframe;

/// Largest candle count a single historical request may ask for
pub const MAX_HISTORY_LIMIT: u32 = 1000;

/// Candle count used when a caller does not specify one
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Request for real-time market data on one exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketDataRequest {
    symbol: String,
    exchange: Exchange,
}

impl MarketDataRequest {
    /// Build a request, normalizing the symbol to uppercase `BASE/QUOTE`
    pub fn new(symbol: &str, exchange: Exchange) -> GatewayResult<Self> {
        Ok(Self {
            symbol: normalize_symbol(symbol)?,
            exchange,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }
}

/// Request for historical candles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalDataRequest {
    #[serde(flatten)]
    market: MarketDataRequest,
    timeframe: Timeframe,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
}

impl HistoricalDataRequest {
    /// Build a historical request; `limit` must lie in `1..=1000`
    pub fn new(
        market: MarketDataRequest,
        timeframe: Timeframe,
        limit: u32,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Self> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(GatewayError::validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_HISTORY_LIMIT, limit
            )));
        }

        Ok(Self {
            market,
            timeframe,
            limit,
            since,
        })
    }

    /// Hourly candles, default limit, no start time
    pub fn with_defaults(market: MarketDataRequest) -> Self {
        Self {
            market,
            timeframe: Timeframe::default(),
            limit: DEFAULT_HISTORY_LIMIT,
            since: None,
        }
    }

    pub fn symbol(&self) -> &str {
        self.market.symbol()
    }

    pub fn exchange(&self) -> Exchange {
        self.market.exchange()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Start time as epoch milliseconds, the unit exchanges expect
    pub fn since_millis(&self) -> Option<i64> {
        self.since.map(|since| since.timestamp_millis())
    }
}

/// Uppercase a `BASE/QUOTE` symbol, rejecting anything without exactly one separator
fn normalize_symbol(symbol: &str) -> GatewayResult<String> {
    let symbol = symbol.trim().to_uppercase();

    match symbol.split_once('/') {
        Some((base, quote))
            if !base.is_empty() && !quote.is_empty() && !quote.contains('/') =>
        {
            Ok(symbol)
        }
        _ => Err(GatewayError::validation(format!(
            "Symbol must be in format BASE/QUOTE (e.g., BTC/USDT), got '{}'",
            symbol
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_is_normalized_to_uppercase() {
        let request = MarketDataRequest::new("btc/usdt", Exchange::Binance).unwrap();
        assert_eq!(request.symbol(), "BTC/USDT");
        assert_eq!(request.exchange(), Exchange::Binance);
    }

    #[test]
    fn test_symbol_without_separator_is_rejected() {
        let err = MarketDataRequest::new("BTCUSDT", Exchange::Binance).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.to_string().contains("BASE/QUOTE"));
    }

    #[test]
    fn test_symbol_with_empty_side_or_extra_separator_is_rejected() {
        assert!(MarketDataRequest::new("/USDT", Exchange::Kraken).is_err());
        assert!(MarketDataRequest::new("BTC/", Exchange::Kraken).is_err());
        assert!(MarketDataRequest::new("BTC/USD/T", Exchange::Kraken).is_err());
    }

    #[test]
    fn test_historical_request_defaults() {
        let market = MarketDataRequest::new("ETH/USDT", Exchange::default()).unwrap();
        let request = HistoricalDataRequest::with_defaults(market);
        assert_eq!(request.timeframe(), Timeframe::OneHour);
        assert_eq!(request.limit(), 100);
        assert!(request.since().is_none());
        assert!(request.since_millis().is_none());
    }

    #[test]
    fn test_historical_request_limit_bounds() {
        let market = MarketDataRequest::new("BTC/USDT", Exchange::Binance).unwrap();

        assert!(HistoricalDataRequest::new(market.clone(), Timeframe::OneHour, 0, None).is_err());
        assert!(
            HistoricalDataRequest::new(market.clone(), Timeframe::OneHour, 1001, None).is_err()
        );
        assert!(HistoricalDataRequest::new(market.clone(), Timeframe::OneHour, 1, None).is_ok());
        assert!(HistoricalDataRequest::new(market, Timeframe::OneHour, 1000, None).is_ok());
    }

    #[test]
    fn test_since_is_exposed_in_millis() {
        let market = MarketDataRequest::new("BTC/USDT", Exchange::Binance).unwrap();
        let since = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let request =
            HistoricalDataRequest::new(market, Timeframe::OneDay, 30, Some(since)).unwrap();
        assert_eq!(request.since_millis(), Some(1_700_000_000_123));
    }
}
