//! Core types for the Crypto Market Data Gateway
//!
//! This crate defines the shared data structures used across the gateway,
//! including exchange identities, validated request models, normalized
//! market data and the gateway-wide error taxonomy.

pub mod error;
pub mod exchange;
pub mod market;
pub mod request;
pub mod timeframe;

pub use error::{GatewayError, GatewayResult, UpstreamError};
pub use exchange::Exchange;
pub use market::{BookSpread, OhlcvData, OrderBookData, OrderBookLevel, TickerData};
pub use request::{
    HistoricalDataRequest, MarketDataRequest, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
pub use timeframe::Timeframe;
