//! Error types for the gateway

use thiserror::Error;

/// Faults surfaced by an exchange connector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Transport-level failure (connect, timeout, TLS, broken body)
    #[error("Network error: {0}")]
    Network(String),

    /// The exchange answered, but with an error or an unusable payload
    #[error("Exchange error: {0}")]
    Exchange(String),
}

impl UpstreamError {
    pub fn network(msg: impl Into<String>) -> Self {
        UpstreamError::Network(msg.into())
    }

    pub fn exchange(msg: impl Into<String>) -> Self {
        UpstreamError::Exchange(msg.into())
    }
}

/// Gateway-wide error type
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request, raised before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Exchange {0} not supported or not initialized")]
    UnsupportedExchange(String),

    /// Upstream fault caught at a single-exchange operation boundary
    #[error("Failed to fetch {operation} from {exchange}: {source}")]
    Fetch {
        operation: &'static str,
        exchange: String,
        #[source]
        source: UpstreamError,
    },

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }

    pub fn unsupported(exchange: impl Into<String>) -> Self {
        GatewayError::UnsupportedExchange(exchange.into())
    }

    pub fn fetch(
        operation: &'static str,
        exchange: impl Into<String>,
        source: UpstreamError,
    ) -> Self {
        GatewayError::Fetch {
            operation,
            exchange: exchange.into(),
            source,
        }
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        GatewayError::NoData(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_carries_cause_text() {
        let err = GatewayError::fetch(
            "ticker",
            "binance",
            UpstreamError::network("connection reset"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to fetch ticker from binance: Network error: connection reset"
        );
    }
}
