//! Caching and aggregation engine for the Crypto Market Data Gateway
//!
//! This crate sits between callers and the exchange connectors: it caches
//! normalized market data, fans queries out across exchanges, and derives
//! analytics from the fetched series.

pub mod config;
pub mod exchange_registry;
pub mod market_cache;
pub mod market_service;
pub mod market_stats;
mod normalize;

pub use config::{CacheConfig, CachePolicy, GatewayConfig};
pub use exchange_registry::{ExchangeHandle, ExchangeRegistry};
pub use market_cache::{CacheCategory, CacheKey, CacheStats, MarketCache, TtlCache};
pub use market_service::{ExchangeInfo, MarketDataService, ServerStatus, SYMBOL_SEARCH_LIMIT};
pub use market_stats::{
    ExchangePrice, MovingAverageSignal, PriceComparison, PriceStatistics, Signal, VolumeAnalysis,
    VolumeSpike,
};
