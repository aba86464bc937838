//! The exchange capability the gateway engine depends on

use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::{Exchange, Timeframe, UpstreamError};
use serde::{Deserialize, Serialize};

use crate::rate_limiter::RateLimiterStats;
use crate::types::{ExchangeDescription, MarketCatalog, RawCandle, RawOrderBook, RawTicker};
use crate::{binance, bitfinex, coinbase, huobi, kraken};

/// Market-data operations offered by one exchange
///
/// Every operation is a suspension point from the caller's perspective;
/// implementations absorb whether the underlying transport is blocking
/// or asynchronous.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Static metadata about the exchange
    fn describe(&self) -> ExchangeDescription;

    /// Request pacing counters, if the connector paces its requests
    fn pacing(&self) -> Option<RateLimiterStats> {
        None
    }

    /// Download the exchange's symbol catalog
    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError>;

    /// Fetch the current ticker for a unified `BASE/QUOTE` symbol
    async fn fetch_ticker(&self, symbol: &str) -> Result<RawTicker, UpstreamError>;

    /// Fetch at least `limit` levels per side when the exchange allows it
    async fn fetch_order_book(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<RawOrderBook, UpstreamError>;

    /// Fetch up to `limit` candles, oldest first, starting at `since` (epoch ms) if given
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError>;
}

/// Settings shared by every REST connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pace requests to each exchange at its published rate limit
    #[serde(default = "default_enable_rate_limit")]
    pub enable_rate_limit: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            enable_rate_limit: default_enable_rate_limit(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_enable_rate_limit() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("crypto-market-gateway/{}", env!("CARGO_PKG_VERSION"))
}

/// Construct the REST connector for `exchange`
pub fn build_connector(
    exchange: Exchange,
    config: &ConnectorConfig,
) -> Result<Arc<dyn ExchangeConnector>, UpstreamError> {
    let connector: Arc<dyn ExchangeConnector> = match exchange {
        Exchange::Binance => Arc::new(binance::BinanceConnector::new(config)?),
        Exchange::Coinbase => Arc::new(coinbase::CoinbaseConnector::new(config)?),
        Exchange::Kraken => Arc::new(kraken::KrakenConnector::new(config)?),
        Exchange::Bitfinex => Arc::new(bitfinex::BitfinexConnector::new(config)?),
        Exchange::Huobi => Arc::new(huobi::HuobiConnector::new(config)?),
    };
    Ok(connector)
}
