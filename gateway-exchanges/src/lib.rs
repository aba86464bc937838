//! Exchange connectivity for the Crypto Market Data Gateway
//!
//! Defines the [`ExchangeConnector`] capability the gateway engine talks to,
//! plus public-endpoint REST connectors for every supported exchange.
//! Each connector maps unified `BASE/QUOTE` symbols and timeframes to the
//! exchange's native ones and parses native payloads into the unified raw
//! shapes in [`types`].

pub mod binance;
pub mod bitfinex;
pub mod coinbase;
pub mod connector;
pub mod huobi;
pub mod kraken;
pub mod rate_limiter;
pub mod rest;
pub mod types;

pub use connector::{build_connector, ConnectorConfig, ExchangeConnector};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use types::{
    Capabilities, ExchangeDescription, MarketCatalog, MarketInfo, RawCandle, RawOrderBook,
    RawTicker,
};
