//! Market data cache
//!
//! In-memory, per-category TTL cache sitting in front of the exchange
//! connectors. Entries are keyed by an MD5 digest of the category and the
//! request parameters, so equal requests share an entry regardless of the
//! order their parameters were supplied in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use gateway_core::{
    HistoricalDataRequest, MarketDataRequest, OhlcvData, OrderBookData, TickerData,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::{CacheConfig, CachePolicy};

/// Kind of data a cache entry holds; each kind has its own TTL and capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Ticker,
    Ohlcv,
    #[serde(rename = "orderbook")]
    OrderBook,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Ticker => "ticker",
            CacheCategory::Ohlcv => "ohlcv",
            CacheCategory::OrderBook => "orderbook",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 32-char hex MD5 digest identifying one cached request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Digest of `"<category>:" + "name=value"` pairs sorted by name, joined by `:`
    pub fn new<K, V, I>(category: CacheCategory, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let sorted: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();

        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(":");

        let raw = format!("{}:{}", category, joined);
        CacheKey(format!("{:x}", md5::compute(raw.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Key/value store with a fixed TTL and a ceiling on the number of entries
///
/// Reads never mutate: an expired entry is reported as a miss and stays in
/// place until it is overwritten, purged by an overflowing insert, or
/// cleared. Inserting a new key into a full cache purges expired entries
/// first and then, if still full, evicts the entry closest to expiry.
pub struct TtlCache<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    /// Serializes admission of new keys so capacity is never exceeded
    admission: Mutex<()>,
    policy: CachePolicy,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: DashMap::new(),
            admission: Mutex::new(()),
            policy,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace, restarting the entry's TTL
    pub fn put(&self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.policy.ttl(),
        };

        if let Some(mut existing) = self.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        let _admission = self.admission.lock();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.policy.capacity {
            self.make_room();
        }
        self.entries.insert(key, entry);
    }

    fn make_room(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before - self.entries.len();
        if purged > 0 {
            trace!("Purged {} expired cache entries", purged);
        }

        if self.entries.len() < self.policy.capacity {
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());

        if let Some(victim) = victim {
            trace!("Evicting cache entry {}", victim);
            self.entries.remove(&victim);
        }
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Live entry counts per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub ticker: usize,
    pub ohlcv: usize,
    pub orderbook: usize,
}

/// Typed cache for every market data category
pub struct MarketCache {
    tickers: TtlCache<TickerData>,
    ohlcv: TtlCache<Arc<Vec<OhlcvData>>>,
    orderbooks: TtlCache<OrderBookData>,
}

impl MarketCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            tickers: TtlCache::new(config.ticker),
            ohlcv: TtlCache::new(config.ohlcv),
            orderbooks: TtlCache::new(config.orderbook),
        }
    }

    pub fn ticker_key(request: &MarketDataRequest) -> CacheKey {
        CacheKey::new(
            CacheCategory::Ticker,
            [
                ("symbol", request.symbol().to_string()),
                ("exchange", request.exchange().to_string()),
            ],
        )
    }

    pub fn ohlcv_key(request: &HistoricalDataRequest) -> CacheKey {
        let mut params = vec![
            ("symbol", request.symbol().to_string()),
            ("exchange", request.exchange().to_string()),
            ("timeframe", request.timeframe().to_string()),
            ("limit", request.limit().to_string()),
        ];
        if let Some(since) = request.since_millis() {
            params.push(("since", since.to_string()));
        }
        CacheKey::new(CacheCategory::Ohlcv, params)
    }

    pub fn orderbook_key(request: &MarketDataRequest, limit: usize) -> CacheKey {
        CacheKey::new(
            CacheCategory::OrderBook,
            [
                ("symbol", request.symbol().to_string()),
                ("exchange", request.exchange().to_string()),
                ("limit", limit.to_string()),
            ],
        )
    }

    pub fn get_ticker(&self, key: &CacheKey) -> Option<TickerData> {
        let hit = self.tickers.get(key);
        if hit.is_some() {
            debug!("Ticker cache hit: {}", key);
        }
        hit
    }

    pub fn put_ticker(&self, key: CacheKey, ticker: TickerData) {
        self.tickers.put(key, ticker);
    }

    pub fn get_ohlcv(&self, key: &CacheKey) -> Option<Arc<Vec<OhlcvData>>> {
        let hit = self.ohlcv.get(key);
        if hit.is_some() {
            debug!("OHLCV cache hit: {}", key);
        }
        hit
    }

    pub fn put_ohlcv(&self, key: CacheKey, candles: Arc<Vec<OhlcvData>>) {
        self.ohlcv.put(key, candles);
    }

    pub fn get_orderbook(&self, key: &CacheKey) -> Option<OrderBookData> {
        let hit = self.orderbooks.get(key);
        if hit.is_some() {
            debug!("Order book cache hit: {}", key);
        }
        hit
    }

    pub fn put_orderbook(&self, key: CacheKey, book: OrderBookData) {
        self.orderbooks.put(key, book);
    }

    pub fn len(&self, category: CacheCategory) -> usize {
        match category {
            CacheCategory::Ticker => self.tickers.len(),
            CacheCategory::Ohlcv => self.ohlcv.len(),
            CacheCategory::OrderBook => self.orderbooks.len(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            ticker: self.tickers.len(),
            ohlcv: self.ohlcv.len(),
            orderbook: self.orderbooks.len(),
        }
    }

    pub fn clear_all(&self) {
        self.tickers.clear();
        self.ohlcv.clear();
        self.orderbooks.clear();
        info!("All caches cleared");
    }
}
