//! Per-exchange request pacing
//!
//! Each REST client holds one pacer sized to the exchange's published
//! interval. A burst of cache misses is spread out instead of tripping the
//! exchange's public limits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gateway_core::Exchange;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Minimum spacing between requests to one exchange
///
/// Callers reserve the next free slot while holding the lock and sleep
/// after releasing it, so concurrent callers land on distinct slots.
#[derive(Debug)]
pub struct RateLimiter {
    exchange: Exchange,
    interval: Duration,
    /// Earliest instant the next request may go out
    next_slot: Mutex<Option<Instant>>,
    requests: AtomicU64,
    delayed: AtomicU64,
}

impl RateLimiter {
    pub fn new(exchange: Exchange, interval: Duration) -> Self {
        Self {
            exchange,
            interval,
            next_slot: Mutex::new(None),
            requests: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
        }
    }

    /// Wait for this caller's slot; returns how long it waited
    pub async fn acquire(&self) -> Duration {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            self.delayed.fetch_add(1, Ordering::Relaxed);
            debug!("Pacing {} request for {:?}", self.exchange, wait);
            tokio::time::sleep_until(slot).await;
        }
        wait
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            exchange: self.exchange,
            requests: self.requests.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            interval_ms: self.interval.as_millis() as u64,
        }
    }
}

/// Counters for one pacer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub exchange: Exchange,
    pub requests: u64,
    /// Requests that had to sleep for their slot
    pub delayed: u64,
    pub interval_ms: u64,
}
