//! Exchange definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GatewayError;

/// Supported cryptocurrency exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Coinbase,
    Kraken,
    Bitfinex,
    Huobi,
}

impl Exchange {
    /// Every supported exchange, in registration order
    pub const ALL: [Exchange; 5] = [
        Exchange::Binance,
        Exchange::Coinbase,
        Exchange::Kraken,
        Exchange::Bitfinex,
        Exchange::Huobi,
    ];

    /// Lowercase identifier used in cache keys and responses
    pub fn id(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Coinbase => "coinbase",
            Exchange::Kraken => "kraken",
            Exchange::Bitfinex => "bitfinex",
            Exchange::Huobi => "huobi",
        }
    }

    /// Get the full display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Exchange::Binance => "Binance",
            Exchange::Coinbase => "Coinbase Exchange",
            Exchange::Kraken => "Kraken",
            Exchange::Bitfinex => "Bitfinex",
            Exchange::Huobi => "Huobi",
        }
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Exchange::Binance
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Exchange {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "coinbase" => Ok(Exchange::Coinbase),
            "kraken" => Ok(Exchange::Kraken),
            "bitfinex" => Ok(Exchange::Bitfinex),
            "huobi" | "htx" => Ok(Exchange::Huobi),
            _ => Err(GatewayError::validation(format!("Unknown exchange: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_parsing() {
        assert_eq!("binance".parse::<Exchange>().unwrap(), Exchange::Binance);
        assert_eq!("KRAKEN".parse::<Exchange>().unwrap(), Exchange::Kraken);
        assert_eq!(" Huobi ".parse::<Exchange>().unwrap(), Exchange::Huobi);
        assert!("ftx".parse::<Exchange>().is_err());
    }

    #[test]
    fn test_exchange_serializes_lowercase() {
        let json = serde_json::to_string(&Exchange::Bitfinex).unwrap();
        assert_eq!(json, "\"bitfinex\"");
        for exchange in Exchange::ALL {
            assert_eq!(exchange.to_string(), exchange.id());
        }
    }
}
