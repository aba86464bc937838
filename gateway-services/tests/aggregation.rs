//! End-to-end behaviour of the aggregation engine over mock connectors

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::{Exchange, GatewayError, MarketDataRequest, Timeframe, UpstreamError};
use gateway_exchanges::{
    Capabilities, ExchangeConnector, ExchangeDescription, MarketCatalog, MarketInfo, RawCandle,
    RawOrderBook, RawTicker,
};
use gateway_services::{ExchangeRegistry, GatewayConfig, MarketDataService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Clone, Copy)]
enum Behaviour {
    Healthy(Decimal),
    NetworkDown,
    Rejects,
    Hangs,
}

struct MockConnector {
    exchange: Exchange,
    behaviour: Behaviour,
    ticker_calls: AtomicUsize,
}

impl MockConnector {
    fn new(exchange: Exchange, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            exchange,
            behaviour,
            ticker_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.ticker_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeConnector for MockConnector {
    fn describe(&self) -> ExchangeDescription {
        ExchangeDescription {
            id: self.exchange,
            name: self.exchange.display_name(),
            countries: vec![],
            has: Capabilities {
                ticker: true,
                ohlcv: false,
                orderbook: false,
                trades: false,
            },
            timeframes: vec![],
            rate_limit_ms: 0,
        }
    }

    async fn load_markets(&self) -> Result<MarketCatalog, UpstreamError> {
        Ok([MarketInfo::new("BTCUSDT", "BTC", "USDT", true)]
            .into_iter()
            .collect())
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<RawTicker, UpstreamError> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Healthy(last) => Ok(RawTicker {
                timestamp_ms: Some(1_700_000_000_000),
                last: Some(last),
                bid: Some(last - dec!(1)),
                ask: Some(last + dec!(1)),
                high: Some(last),
                low: Some(last),
                base_volume: Some(dec!(5)),
                percentage: Some(dec!(0.5)),
            }),
            Behaviour::NetworkDown => Err(UpstreamError::network("connection refused")),
            Behaviour::Rejects => Err(UpstreamError::exchange("Invalid symbol")),
            Behaviour::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(UpstreamError::network("unreachable"))
            }
        }
    }

    async fn fetch_order_book(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> Result<RawOrderBook, UpstreamError> {
        Err(UpstreamError::exchange("order book not supported"))
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _since: Option<i64>,
        _limit: u32,
    ) -> Result<Vec<RawCandle>, UpstreamError> {
        Err(UpstreamError::exchange("OHLCV not supported"))
    }
}

/// Engine over the given mocks; exchanges without a mock fail to initialize
fn engine(mocks: &[Arc<MockConnector>], config: GatewayConfig) -> MarketDataService {
    let registry = ExchangeRegistry::build(|exchange| {
        mocks
            .iter()
            .find(|mock| mock.exchange == exchange)
            .map(|mock| Arc::clone(mock) as Arc<dyn ExchangeConnector>)
            .ok_or_else(|| UpstreamError::network("no mock"))
    });
    MarketDataService::with_registry(&config, Arc::new(registry))
}

#[tokio::test(start_paused = true)]
async fn repeated_ticker_within_ttl_hits_upstream_once() {
    let binance = MockConnector::new(Exchange::Binance, Behaviour::Healthy(dec!(50000)));
    let service = engine(&[binance.clone()], GatewayConfig::default());
    let request = MarketDataRequest::new("BTC/USDT", Exchange::Binance).unwrap();

    let first = service.get_ticker(&request).await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    let second = service.get_ticker(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(binance.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    service.get_ticker(&request).await.unwrap();
    assert_eq!(binance.calls(), 2);

    let status = service.server_status();
    assert_eq!(status.total_requests, 3);
    assert_eq!(status.total_errors, 0);
}

#[tokio::test]
async fn fan_out_omits_failing_exchanges() {
    let mocks = [
        MockConnector::new(Exchange::Binance, Behaviour::Healthy(dec!(50000))),
        MockConnector::new(Exchange::Kraken, Behaviour::NetworkDown),
        MockConnector::new(Exchange::Coinbase, Behaviour::Healthy(dec!(50100))),
    ];
    let service = engine(&mocks, GatewayConfig::default());

    let tickers = service
        .get_multi_exchange_ticker(
            "btc/usdt",
            Some(&[Exchange::Binance, Exchange::Kraken, Exchange::Coinbase]),
        )
        .await;

    let keys: HashSet<Exchange> = tickers.keys().copied().collect();
    assert_eq!(keys, HashSet::from([Exchange::Binance, Exchange::Coinbase]));
    assert_eq!(tickers[&Exchange::Coinbase].last, dec!(50100));

    let status = service.server_status();
    assert_eq!(status.total_requests, 3);
    assert_eq!(status.total_errors, 1);
}

#[tokio::test]
async fn fan_out_over_all_exchanges_tolerates_missing_connectors() {
    let mocks = [MockConnector::new(Exchange::Huobi, Behaviour::Healthy(dec!(1)))];
    let service = engine(&mocks, GatewayConfig::default());

    let tickers = service.get_multi_exchange_ticker("BTC/USDT", None).await;
    assert_eq!(tickers.len(), 1);
    assert!(tickers.contains_key(&Exchange::Huobi));

    assert_eq!(service.server_status().total_errors, 4);
}

#[tokio::test]
async fn fan_out_with_invalid_symbol_is_empty_and_uncounted() {
    let mocks = [MockConnector::new(Exchange::Binance, Behaviour::Healthy(dec!(1)))];
    let service = engine(&mocks, GatewayConfig::default());

    let tickers = service
        .get_multi_exchange_ticker("BTCUSDT", Some(&[Exchange::Binance]))
        .await;

    assert!(tickers.is_empty());
    assert_eq!(mocks[0].calls(), 0);
    assert_eq!(service.server_status().total_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn hung_exchange_times_out_without_blocking_others() {
    let mocks = [
        MockConnector::new(Exchange::Binance, Behaviour::Healthy(dec!(100))),
        MockConnector::new(Exchange::Bitfinex, Behaviour::Hangs),
    ];
    let config = GatewayConfig {
        fanout_timeout_ms: Some(500),
        ..GatewayConfig::default()
    };
    let service = engine(&mocks, config);

    let tickers = service
        .get_multi_exchange_ticker("BTC/USDT", Some(&[Exchange::Binance, Exchange::Bitfinex]))
        .await;

    assert_eq!(tickers.len(), 1);
    assert!(tickers.contains_key(&Exchange::Binance));
    assert_eq!(service.server_status().total_errors, 1);
}

#[tokio::test]
async fn every_upstream_fault_counts_one_error() {
    let mocks = [
        MockConnector::new(Exchange::Kraken, Behaviour::Rejects),
        MockConnector::new(Exchange::Huobi, Behaviour::NetworkDown),
    ];
    let service = engine(&mocks, GatewayConfig::default());

    for exchange in [Exchange::Kraken, Exchange::Huobi, Exchange::Kraken] {
        let request = MarketDataRequest::new("BTC/USDT", exchange).unwrap();
        let err = service.get_ticker(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Fetch { .. }));
        assert!(err.to_string().contains(exchange.id()));
    }

    let status = service.server_status();
    assert_eq!(status.total_requests, 3);
    assert_eq!(status.total_errors, 3);
    assert_eq!(status.error_rate, 1.0);
    assert_eq!(status.cache_stats.ticker, 0);
}

#[tokio::test]
async fn compare_prices_reports_spread_across_exchanges() {
    let mocks = [
        MockConnector::new(Exchange::Binance, Behaviour::Healthy(dec!(100))),
        MockConnector::new(Exchange::Kraken, Behaviour::Healthy(dec!(101))),
        MockConnector::new(Exchange::Coinbase, Behaviour::Rejects),
    ];
    let service = engine(&mocks, GatewayConfig::default());

    let comparison = service.compare_prices("BTC/USDT", None).await.unwrap();
    assert_eq!(comparison.lowest.exchange, Exchange::Binance);
    assert_eq!(comparison.highest.exchange, Exchange::Kraken);
    assert_eq!(comparison.spread_percent, dec!(1));

    let lonely = engine(&mocks[..1], GatewayConfig::default());
    assert!(matches!(
        lonely.compare_prices("BTC/USDT", None).await,
        Err(GatewayError::NoData(_))
    ));
}
