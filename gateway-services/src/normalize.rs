//! Conversion of connector payloads into gateway market types

use chrono::{DateTime, Utc};
use gateway_core::{
    MarketDataRequest, OhlcvData, OrderBookData, OrderBookLevel, TickerData, UpstreamError,
};
use gateway_exchanges::{RawCandle, RawOrderBook, RawTicker};
use rust_decimal::Decimal;

/// Epoch milliseconds to UTC, falling back to the current time
fn timestamp_or_now(timestamp_ms: Option<i64>) -> DateTime<Utc> {
    timestamp_ms
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

fn required(
    value: Option<Decimal>,
    field: &str,
    request: &MarketDataRequest,
) -> Result<Decimal, UpstreamError> {
    value.ok_or_else(|| {
        UpstreamError::exchange(format!(
            "{} ticker for {} has no {}",
            request.exchange().display_name(),
            request.symbol(),
            field
        ))
    })
}

pub fn ticker(request: &MarketDataRequest, raw: RawTicker) -> Result<TickerData, UpstreamError> {
    let last = required(raw.last, "last price", request)?;

    Ok(TickerData {
        symbol: request.symbol().to_string(),
        exchange: request.exchange(),
        timestamp: timestamp_or_now(raw.timestamp_ms),
        last,
        bid: raw.bid.unwrap_or(last),
        ask: raw.ask.unwrap_or(last),
        high: required(raw.high, "24h high", request)?,
        low: required(raw.low, "24h low", request)?,
        volume: required(raw.base_volume, "24h volume", request)?,
        change_24h: raw.percentage,
    })
}

/// Candles keep the connector's order
pub fn candles(raw: Vec<RawCandle>) -> Result<Vec<OhlcvData>, UpstreamError> {
    raw.into_iter()
        .map(|candle| {
            let timestamp = DateTime::<Utc>::from_timestamp_millis(candle.timestamp_ms)
                .ok_or_else(|| {
                    UpstreamError::exchange(format!(
                        "Candle timestamp out of range: {}",
                        candle.timestamp_ms
                    ))
                })?;

            Ok(OhlcvData {
                timestamp,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            })
        })
        .collect()
}

/// Each side is truncated to `depth` levels
pub fn order_book(request: &MarketDataRequest, raw: RawOrderBook, depth: usize) -> OrderBookData {
    let side = |levels: Vec<(Decimal, Decimal)>| -> Vec<OrderBookLevel> {
        levels
            .into_iter()
            .take(depth)
            .map(|(price, amount)| OrderBookLevel::new(price, amount))
            .collect()
    };

    OrderBookData {
        symbol: request.symbol().to_string(),
        exchange: request.exchange(),
        timestamp: timestamp_or_now(raw.timestamp_ms),
        bids: side(raw.bids),
        asks: side(raw.asks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::Exchange;
    use rust_decimal_macros::dec;

    fn request() -> MarketDataRequest {
        MarketDataRequest::new("eth/usdt", Exchange::Kraken).unwrap()
    }

    fn full_ticker() -> RawTicker {
        RawTicker {
            timestamp_ms: Some(1_700_000_000_000),
            last: Some(dec!(2000)),
            bid: Some(dec!(1999)),
            ask: Some(dec!(2001)),
            high: Some(dec!(2100)),
            low: Some(dec!(1900)),
            base_volume: Some(dec!(12.5)),
            percentage: Some(dec!(-1.2)),
        }
    }

    #[test]
    fn test_ticker_carries_request_identity() {
        let ticker = ticker(&request(), full_ticker()).unwrap();
        assert_eq!(ticker.symbol, "ETH/USDT");
        assert_eq!(ticker.exchange, Exchange::Kraken);
        assert_eq!(ticker.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(ticker.change_24h, Some(dec!(-1.2)));
    }

    #[test]
    fn test_ticker_bid_ask_fall_back_to_last() {
        let raw = RawTicker {
            bid: None,
            ask: None,
            ..full_ticker()
        };
        let ticker = ticker(&request(), raw).unwrap();
        assert_eq!(ticker.bid, dec!(2000));
        assert_eq!(ticker.ask, dec!(2000));
    }

    #[test]
    fn test_ticker_without_last_is_exchange_fault() {
        let raw = RawTicker {
            last: None,
            ..full_ticker()
        };
        assert!(matches!(
            ticker(&request(), raw),
            Err(UpstreamError::Exchange(_))
        ));
    }

    #[test]
    fn test_missing_timestamp_uses_now() {
        let before = Utc::now();
        let raw = RawTicker {
            timestamp_ms: None,
            ..full_ticker()
        };
        let ticker = ticker(&request(), raw).unwrap();
        assert!(ticker.timestamp >= before);
    }

    #[test]
    fn test_order_book_truncated_to_depth() {
        let raw = RawOrderBook {
            timestamp_ms: None,
            bids: vec![(dec!(10), dec!(1)), (dec!(9), dec!(2)), (dec!(8), dec!(3))],
            asks: vec![(dec!(11), dec!(1))],
        };
        let book = order_book(&request(), raw, 2);

        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[1], OrderBookLevel::new(dec!(9), dec!(2)));
        assert_eq!(book.asks.len(), 1);
    }

    #[test]
    fn test_candles_keep_upstream_order() {
        let raw = vec![
            RawCandle {
                timestamp_ms: 2_000,
                open: dec!(1),
                high: dec!(2),
                low: dec!(0.5),
                close: dec!(1.5),
                volume: dec!(10),
            },
            RawCandle {
                timestamp_ms: 1_000,
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: dec!(0),
            },
        ];
        let candles = candles(raw).unwrap();
        assert_eq!(candles[0].timestamp.timestamp_millis(), 2_000);
        assert_eq!(candles[1].timestamp.timestamp_millis(), 1_000);
    }
}
