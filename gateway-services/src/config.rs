//! Gateway configuration
//!
//! Defaults cover every field; `from_env` overlays `GATEWAY_*` variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use gateway_core::{GatewayError, GatewayResult};
use gateway_exchanges::ConnectorConfig;
use serde::{Deserialize, Serialize};

/// TTL and size ceiling for one cache category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl CachePolicy {
    pub const fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self { ttl_secs, capacity }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ticker_policy")]
    pub ticker: CachePolicy,
    #[serde(default = "default_ohlcv_policy")]
    pub ohlcv: CachePolicy,
    #[serde(default = "default_orderbook_policy")]
    pub orderbook: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ticker: default_ticker_policy(),
            ohlcv: default_ohlcv_policy(),
            orderbook: default_orderbook_policy(),
        }
    }
}

/// Top-level configuration for the aggregation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-exchange deadline for multi-exchange queries; `None` waits forever
    #[serde(default = "default_fanout_timeout_ms")]
    pub fanout_timeout_ms: Option<u64>,
    #[serde(default)]
    pub connector: ConnectorConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fanout_timeout_ms: default_fanout_timeout_ms(),
            connector: ConnectorConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables on top of the defaults
    ///
    /// Recognized variables:
    /// - GATEWAY_TICKER_TTL_SECS / GATEWAY_TICKER_CAPACITY
    /// - GATEWAY_OHLCV_TTL_SECS / GATEWAY_OHLCV_CAPACITY
    /// - GATEWAY_ORDERBOOK_TTL_SECS / GATEWAY_ORDERBOOK_CAPACITY
    /// - GATEWAY_FANOUT_TIMEOUT_MS (0 disables the deadline)
    /// - GATEWAY_HTTP_TIMEOUT_SECS
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        overlay(&lookup, "GATEWAY_TICKER_TTL_SECS", &mut config.cache.ticker.ttl_secs)?;
        overlay(&lookup, "GATEWAY_TICKER_CAPACITY", &mut config.cache.ticker.capacity)?;
        overlay(&lookup, "GATEWAY_OHLCV_TTL_SECS", &mut config.cache.ohlcv.ttl_secs)?;
        overlay(&lookup, "GATEWAY_OHLCV_CAPACITY", &mut config.cache.ohlcv.capacity)?;
        overlay(&lookup, "GATEWAY_ORDERBOOK_TTL_SECS", &mut config.cache.orderbook.ttl_secs)?;
        overlay(&lookup, "GATEWAY_ORDERBOOK_CAPACITY", &mut config.cache.orderbook.capacity)?;
        overlay(&lookup, "GATEWAY_HTTP_TIMEOUT_SECS", &mut config.connector.timeout_secs)?;

        let mut fanout_ms = config.fanout_timeout_ms.unwrap_or(0);
        overlay(&lookup, "GATEWAY_FANOUT_TIMEOUT_MS", &mut fanout_ms)?;
        config.fanout_timeout_ms = (fanout_ms > 0).then_some(fanout_ms);

        for (name, policy) in [
            ("ticker", config.cache.ticker),
            ("ohlcv", config.cache.ohlcv),
            ("orderbook", config.cache.orderbook),
        ] {
            if policy.capacity == 0 {
                return Err(GatewayError::config(format!(
                    "{} cache capacity must be at least 1",
                    name
                )));
            }
        }

        Ok(config)
    }

    pub fn fanout_timeout(&self) -> Option<Duration> {
        self.fanout_timeout_ms.map(Duration::from_millis)
    }
}

fn overlay<F, T>(lookup: &F, name: &str, target: &mut T) -> GatewayResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid value for {}: {} ({})", name, raw, e)))?;
    }
    Ok(())
}

fn default_ticker_policy() -> CachePolicy {
    CachePolicy::new(10, 1000)
}

fn default_ohlcv_policy() -> CachePolicy {
    CachePolicy::new(60, 500)
}

fn default_orderbook_policy() -> CachePolicy {
    CachePolicy::new(5, 500)
}

fn default_fanout_timeout_ms() -> Option<u64> {
    Some(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache.ticker, CachePolicy::new(10, 1000));
        assert_eq!(config.cache.ohlcv, CachePolicy::new(60, 500));
        assert_eq!(config.cache.orderbook, CachePolicy::new(5, 500));
        assert_eq!(config.fanout_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.connector.timeout_secs, 30);
    }

    #[test]
    fn test_env_overlay() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_TICKER_TTL_SECS", "3"),
            ("GATEWAY_OHLCV_CAPACITY", "42"),
            ("GATEWAY_HTTP_TIMEOUT_SECS", " 5 "),
        ]))
        .unwrap();

        assert_eq!(config.cache.ticker.ttl_secs, 3);
        assert_eq!(config.cache.ticker.capacity, 1000);
        assert_eq!(config.cache.ohlcv.capacity, 42);
        assert_eq!(config.connector.timeout_secs, 5);
    }

    #[test]
    fn test_zero_fanout_timeout_disables_deadline() {
        let config =
            GatewayConfig::from_lookup(lookup(&[("GATEWAY_FANOUT_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(config.fanout_timeout(), None);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_TICKER_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = GatewayConfig::from_lookup(lookup(&[("GATEWAY_ORDERBOOK_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
