//! Shared REST plumbing for exchange connectors
//!
//! Every connector talks JSON over HTTPS through a [`RestClient`], which
//! paces requests and classifies failures into [`UpstreamError`] variants:
//! transport failures are network faults, anything the exchange answered
//! with (error status, unparseable body) is an exchange fault.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use gateway_core::{Exchange, UpstreamError};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::connector::ConnectorConfig;
use crate::rate_limiter::{RateLimiter, RateLimiterStats};

/// JSON-over-HTTPS client bound to one exchange
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    exchange: Exchange,
    limiter: Option<Arc<RateLimiter>>,
}

impl RestClient {
    /// Build a client for `exchange`; fails if the HTTP stack cannot be initialized
    pub fn new(
        exchange: Exchange,
        base_url: &str,
        rate_limit_ms: u64,
        config: &ConnectorConfig,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                UpstreamError::network(format!("Failed to create HTTP client: {}", e))
            })?;

        let limiter = config
            .enable_rate_limit
            .then(|| Arc::new(RateLimiter::new(exchange, Duration::from_millis(rate_limit_ms))));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            exchange,
            limiter,
        })
    }

    /// Pacing counters, `None` when rate limiting is disabled
    pub fn pacing(&self) -> Option<RateLimiterStats> {
        self.limiter.as_ref().map(|limiter| limiter.stats())
    }

    /// GET `path` with `query` and parse the body as JSON
    #[instrument(skip(self, query), fields(exchange = %self.exchange))]
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::network(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            UpstreamError::network(format!("Failed to read response from {}: {}", url, e))
        })?;

        if !status.is_success() {
            return Err(UpstreamError::exchange(format!(
                "{} API error ({}): {}",
                self.exchange.display_name(),
                status,
                body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            UpstreamError::exchange(format!(
                "Failed to parse {} response: {}",
                self.exchange.display_name(),
                e
            ))
        })
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("exchange", &self.exchange)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ============================================================================
// Payload helpers
// ============================================================================

/// Parse a decimal from a JSON string or number
pub(crate) fn decimal(value: &Value, field: &str) -> Result<Decimal, UpstreamError> {
    opt_decimal(Some(value))
        .ok_or_else(|| UpstreamError::exchange(format!("Invalid decimal for '{}': {}", field, value)))
}

/// Like [`decimal`], but missing, null, or malformed values become `None`
pub(crate) fn opt_decimal(value: Option<&Value>) -> Option<Decimal> {
    let text = match value? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if text.is_empty() {
        return None;
    }

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Parse an integer timestamp from a JSON string or number
pub(crate) fn integer(value: &Value, field: &str) -> Result<i64, UpstreamError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| UpstreamError::exchange(format!("Invalid integer for '{}': {}", field, value)))
}

/// Parse a timestamp in seconds and convert it to epoch milliseconds
pub(crate) fn seconds_as_millis(value: &Value, field: &str) -> Result<i64, UpstreamError> {
    integer(value, field)?.checked_mul(1000).ok_or_else(|| {
        UpstreamError::exchange(format!("Timestamp out of range for '{}': {}", field, value))
    })
}

/// Parse an RFC 3339 timestamp into epoch milliseconds
pub(crate) fn rfc3339_millis(value: Option<&Value>) -> Option<i64> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
}

/// Borrow `value` as a JSON array
pub(crate) fn array<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>, UpstreamError> {
    value
        .as_array()
        .ok_or_else(|| UpstreamError::exchange(format!("Expected array for '{}'", field)))
}

/// Borrow element `index` of a JSON array row
pub(crate) fn at<'a>(row: &'a [Value], index: usize, field: &str) -> Result<&'a Value, UpstreamError> {
    row.get(index)
        .ok_or_else(|| UpstreamError::exchange(format!("Missing '{}' at position {}", field, index)))
}

/// Parse `[[price, amount, ...], ...]` into `(price, amount)` levels
pub(crate) fn levels(value: &Value, field: &str) -> Result<Vec<(Decimal, Decimal)>, UpstreamError> {
    array(value, field)?
        .iter()
        .map(|level| {
            let level = array(level, field)?;
            Ok((
                decimal(at(level, 0, field)?, field)?,
                decimal(at(level, 1, field)?, field)?,
            ))
        })
        .collect()
}

/// Percent change from `open` to `last`, `None` when open is zero or unknown
pub(crate) fn percent_change(open: Option<Decimal>, last: Option<Decimal>) -> Option<Decimal> {
    match (open, last) {
        (Some(open), Some(last)) if !open.is_zero() => {
            Some((last - open) / open * Decimal::from(100))
        }
        _ => None,
    }
}

/// Smallest allowed depth that covers `limit`, or the largest allowed depth
pub(crate) fn depth_bucket(limit: usize, allowed: &[usize]) -> usize {
    allowed
        .iter()
        .copied()
        .find(|&depth| depth >= limit)
        .or_else(|| allowed.last().copied())
        .unwrap_or(limit)
}

/// Keep only the newest `limit` candles of an oldest-first series
pub(crate) fn keep_newest<T>(mut candles: Vec<T>, limit: u32) -> Vec<T> {
    let limit = limit as usize;
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}
