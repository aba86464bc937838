//! Unified raw shapes returned by exchange connectors
//!
//! These mirror what an exchange actually reports: fields an exchange does
//! not provide stay `None`, timestamps stay in epoch milliseconds. The
//! gateway engine normalizes them into `gateway_core` market types.

use std::collections::BTreeMap;

use gateway_core::{Exchange, Timeframe};
use rust_decimal::Decimal;
use serde::Serialize;

/// Ticker as reported by an exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTicker {
    pub timestamp_ms: Option<i64>,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    /// 24h volume in base currency
    pub base_volume: Option<Decimal>,
    /// 24h change in percent
    pub percentage: Option<Decimal>,
}

/// Order book as reported by an exchange, levels are `(price, amount)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOrderBook {
    pub timestamp_ms: Option<i64>,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// One candle, always delivered oldest-first by connectors
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandle {
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Metadata for a single tradable pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketInfo {
    /// Exchange-native market id (e.g., "BTCUSDT", "BTC-USD", "tBTCUSD")
    pub id: String,
    /// Unified symbol (e.g., "BTC/USDT")
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub active: bool,
}

impl MarketInfo {
    pub fn new(id: impl Into<String>, base: &str, quote: &str, active: bool) -> Self {
        let base = base.to_uppercase();
        let quote = quote.to_uppercase();
        Self {
            id: id.into(),
            symbol: format!("{}/{}", base, quote),
            base,
            quote,
            active,
        }
    }
}

/// Symbol catalog of an exchange, keyed by unified symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketCatalog {
    markets: BTreeMap<String, MarketInfo>,
}

impl MarketCatalog {
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&MarketInfo> {
        self.markets.get(symbol)
    }

    /// All unified symbols in ascending order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.markets.keys().map(String::as_str)
    }

    /// Symbols containing `query` (case-insensitive), ascending, at most `limit`
    pub fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let query = query.to_uppercase();
        self.symbols()
            .filter(|symbol| symbol.contains(&query))
            .take(limit)
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<MarketInfo> for MarketCatalog {
    fn from_iter<I: IntoIterator<Item = MarketInfo>>(iter: I) -> Self {
        Self {
            markets: iter
                .into_iter()
                .map(|market| (market.symbol.clone(), market))
                .collect(),
        }
    }
}

/// What an exchange connector can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub ticker: bool,
    pub ohlcv: bool,
    pub orderbook: bool,
    pub trades: bool,
}

/// Static description of an exchange connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeDescription {
    pub id: Exchange,
    pub name: &'static str,
    pub countries: Vec<&'static str>,
    pub has: Capabilities,
    /// Timeframes the exchange serves natively
    pub timeframes: Vec<Timeframe>,
    /// Minimum interval between requests in milliseconds
    pub rate_limit_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> MarketCatalog {
        [
            MarketInfo::new("ETHUSDT", "eth", "usdt", true),
            MarketInfo::new("BTCUSDT", "btc", "usdt", true),
            MarketInfo::new("ETHBTC", "eth", "btc", true),
            MarketInfo::new("SOLUSDC", "sol", "usdc", false),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_catalog_is_keyed_by_unified_symbol() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.get("BTC/USDT").is_some());
        assert_eq!(catalog.get("ETH/BTC").map(|m| m.id.as_str()), Some("ETHBTC"));
    }

    #[test]
    fn test_search_is_sorted_case_insensitive_and_limited() {
        let catalog = catalog();
        assert_eq!(catalog.search("btc", 50), vec!["BTC/USDT", "ETH/BTC"]);
        assert_eq!(catalog.search("usd", 2), vec!["BTC/USDT", "ETH/USDT"]);
        assert!(catalog.search("XRP", 50).is_empty());
    }
}
