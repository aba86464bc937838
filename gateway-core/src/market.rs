//! Normalized market data structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::Exchange;

/// Snapshot of the current market for a trading pair on one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerData {
    /// Trading pair (e.g., "BTC/USDT")
    pub symbol: String,
    pub exchange: Exchange,
    pub timestamp: DateTime<Utc>,
    /// Last traded price
    pub last: Decimal,
    /// Best bid (falls back to last when the exchange omits it)
    pub bid: Decimal,
    /// Best ask (falls back to last when the exchange omits it)
    pub ask: Decimal,
    /// 24h high
    pub high: Decimal,
    /// 24h low
    pub low: Decimal,
    /// 24h volume in base currency
    pub volume: Decimal,
    /// 24h change in percent (e.g., 2.5 for +2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<Decimal>,
}

/// A single OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvData {
    /// Start time of the candle
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

// ============================================================================
// Order Book Types
// ============================================================================

/// A single price level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    /// Total amount resting at this level
    pub amount: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

/// Order book snapshot, each side truncated to the requested depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookData {
    pub symbol: String,
    pub exchange: Exchange,
    pub timestamp: DateTime<Utc>,
    /// Bids sorted by price descending (best bid first)
    pub bids: Vec<OrderBookLevel>,
    /// Asks sorted by price ascending (best ask first)
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBookData {
    /// Get the best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Midpoint of best bid and best ask
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Bid-ask spread, absolute and as a percentage of the best bid
    pub fn spread(&self) -> Option<BookSpread> {
        let (best_bid, best_ask) = (self.best_bid()?, self.best_ask()?);
        let spread = best_ask - best_bid;
        let spread_percent = if best_bid > Decimal::ZERO {
            (spread / best_bid) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        Some(BookSpread {
            best_bid,
            best_ask,
            mid_price: self.mid_price()?,
            spread,
            spread_percent,
        })
    }
}

/// Top-of-book spread summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookSpread {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
    pub spread: Decimal,
    pub spread_percent: Decimal,
}
