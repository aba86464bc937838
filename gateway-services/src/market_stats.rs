//! Derived market analytics
//!
//! Pure computations over fetched candles and tickers. The engine fetches
//! the inputs through its cached read paths and hands them to these.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use gateway_core::{
    Exchange, GatewayError, GatewayResult, HistoricalDataRequest, OhlcvData, TickerData,
    Timeframe,
};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Candles whose volume exceeds this multiple of the average count as spikes
const SPIKE_THRESHOLD: Decimal = dec!(1.5);

/// Summary statistics over an OHLCV series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStatistics {
    pub symbol: String,
    pub exchange: Exchange,
    pub timeframe: Timeframe,
    /// Number of candles the statistics cover
    pub period: usize,
    pub current_price: Decimal,
    pub highest_price: Decimal,
    pub lowest_price: Decimal,
    pub average_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub total_volume: Decimal,
    pub average_volume: Decimal,
    /// Population standard deviation of closes
    pub volatility: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl PriceStatistics {
    pub fn compute(request: &HistoricalDataRequest, candles: &[OhlcvData]) -> GatewayResult<Self> {
        let (first, last) = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(GatewayError::no_data(format!(
                    "no candles for {} on {}",
                    request.symbol(),
                    request.exchange()
                )))
            }
        };

        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let count = Decimal::from(candles.len());

        let average_price = closes.iter().sum::<Decimal>() / count;
        let total_volume: Decimal = candles.iter().map(|c| c.volume).sum();
        let price_change = last.close - first.close;
        let price_change_percent = if first.close.is_zero() {
            Decimal::ZERO
        } else {
            price_change / first.close * Decimal::ONE_HUNDRED
        };

        Ok(Self {
            symbol: request.symbol().to_string(),
            exchange: request.exchange(),
            timeframe: request.timeframe(),
            period: candles.len(),
            current_price: last.close,
            highest_price: closes.iter().copied().max().unwrap_or_default(),
            lowest_price: closes.iter().copied().min().unwrap_or_default(),
            average_price,
            price_change,
            price_change_percent,
            total_volume,
            average_volume: total_volume / count,
            volatility: volatility(&closes),
            start_time: first.timestamp,
            end_time: last.timestamp,
        })
    }
}

/// Population standard deviation; zero for fewer than two values
pub fn volatility(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }

    let n = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / n;
    let variance = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>()
        / n;

    variance.sqrt().unwrap_or_default()
}

/// One exchange's last price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExchangePrice {
    pub exchange: Exchange,
    pub price: Decimal,
}

/// Cross-exchange price comparison for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceComparison {
    pub symbol: String,
    pub lowest: ExchangePrice,
    pub highest: ExchangePrice,
    /// `(highest - lowest) / lowest * 100`
    pub spread_percent: Decimal,
    pub prices: BTreeMap<Exchange, Decimal>,
}

impl PriceComparison {
    /// Needs tickers from at least two exchanges
    pub fn compute(symbol: &str, tickers: &HashMap<Exchange, TickerData>) -> GatewayResult<Self> {
        if tickers.len() < 2 {
            return Err(GatewayError::no_data(format!(
                "need prices from at least two exchanges for {}, got {}",
                symbol,
                tickers.len()
            )));
        }

        let prices: BTreeMap<Exchange, Decimal> = tickers
            .iter()
            .map(|(exchange, ticker)| (*exchange, ticker.last))
            .collect();

        let pick = |(exchange, price): (&Exchange, &Decimal)| ExchangePrice {
            exchange: *exchange,
            price: *price,
        };
        let lowest = prices.iter().min_by_key(|(_, p)| **p).map(pick);
        let highest = prices.iter().max_by_key(|(_, p)| **p).map(pick);
        let (Some(lowest), Some(highest)) = (lowest, highest) else {
            return Err(GatewayError::no_data(format!("no prices for {}", symbol)));
        };

        let spread_percent = if lowest.price.is_zero() {
            Decimal::ZERO
        } else {
            (highest.price - lowest.price) / lowest.price * Decimal::ONE_HUNDRED
        };

        Ok(Self {
            symbol: symbol.to_string(),
            lowest,
            highest,
            spread_percent,
            prices,
        })
    }
}

/// Trading signal from a short/long simple moving average crossover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Sell,
    StrongSell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovingAverageSignal {
    pub symbol: String,
    pub exchange: Exchange,
    pub timeframe: Timeframe,
    pub short_period: usize,
    pub long_period: usize,
    pub short_sma: Decimal,
    pub long_sma: Decimal,
    pub current_price: Decimal,
    pub signal: Signal,
}

impl MovingAverageSignal {
    /// Check the window sizes before any data is fetched
    pub fn validate_periods(short: usize, long: usize) -> GatewayResult<()> {
        if short == 0 || short >= long {
            return Err(GatewayError::validation(format!(
                "short period must be at least 1 and below the long period, got {} and {}",
                short, long
            )));
        }
        Ok(())
    }

    pub fn compute(
        request: &HistoricalDataRequest,
        candles: &[OhlcvData],
        short: usize,
        long: usize,
    ) -> GatewayResult<Self> {
        Self::validate_periods(short, long)?;

        if candles.len() < long {
            return Err(GatewayError::no_data(format!(
                "need {} candles for SMA({}), got {}",
                long,
                long,
                candles.len()
            )));
        }

        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let short_sma = sma(&closes, short);
        let long_sma = sma(&closes, long);
        let current_price = closes[closes.len() - 1];

        let signal = if short_sma > long_sma {
            if current_price > short_sma {
                Signal::StrongBuy
            } else {
                Signal::Buy
            }
        } else if current_price < short_sma {
            Signal::StrongSell
        } else {
            Signal::Sell
        };

        Ok(Self {
            symbol: request.symbol().to_string(),
            exchange: request.exchange(),
            timeframe: request.timeframe(),
            short_period: short,
            long_period: long,
            short_sma,
            long_sma,
            current_price,
            signal,
        })
    }
}

/// Mean of the last `period` values; callers guarantee `0 < period <= values.len()`
fn sma(values: &[Decimal], period: usize) -> Decimal {
    let window = &values[values.len() - period..];
    window.iter().sum::<Decimal>() / Decimal::from(period)
}

/// A candle with unusually high volume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSpike {
    pub timestamp: DateTime<Utc>,
    pub volume: Decimal,
    pub percent_of_average: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeAnalysis {
    pub symbol: String,
    pub exchange: Exchange,
    pub timeframe: Timeframe,
    pub average_volume: Decimal,
    pub current_volume: Decimal,
    pub current_percent_of_average: Decimal,
    pub spikes: Vec<VolumeSpike>,
}

impl VolumeAnalysis {
    pub fn compute(request: &HistoricalDataRequest, candles: &[OhlcvData]) -> GatewayResult<Self> {
        let Some(last) = candles.last() else {
            return Err(GatewayError::no_data(format!(
                "no candles for {} on {}",
                request.symbol(),
                request.exchange()
            )));
        };

        let average_volume =
            candles.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(candles.len());
        let percent_of_average = |volume: Decimal| {
            if average_volume.is_zero() {
                Decimal::ZERO
            } else {
                volume / average_volume * Decimal::ONE_HUNDRED
            }
        };

        let threshold = average_volume * SPIKE_THRESHOLD;
        let spikes = candles
            .iter()
            .filter(|c| c.volume > threshold)
            .map(|c| VolumeSpike {
                timestamp: c.timestamp,
                volume: c.volume,
                percent_of_average: percent_of_average(c.volume),
            })
            .collect();

        Ok(Self {
            symbol: request.symbol().to_string(),
            exchange: request.exchange(),
            timeframe: request.timeframe(),
            average_volume,
            current_volume: last.volume,
            current_percent_of_average: percent_of_average(last.volume),
            spikes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gateway_core::MarketDataRequest;

    fn request() -> HistoricalDataRequest {
        HistoricalDataRequest::with_defaults(
            MarketDataRequest::new("BTC/USDT", Exchange::Binance).unwrap(),
        )
    }

    fn candles(closes: &[Decimal], volumes: &[Decimal]) -> Vec<OhlcvData> {
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (close, volume))| OhlcvData {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
                volume: *volume,
            })
            .collect()
    }

    fn ticker(exchange: Exchange, last: Decimal) -> TickerData {
        TickerData {
            symbol: "BTC/USDT".to_string(),
            exchange,
            timestamp: Utc::now(),
            last,
            bid: last,
            ask: last,
            high: last,
            low: last,
            volume: Decimal::ZERO,
            change_24h: None,
        }
    }

    #[test]
    fn test_statistics_over_known_series() {
        let series = candles(
            &[dec!(100), dec!(105), dec!(103), dec!(107), dec!(104)],
            &[dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)],
        );
        let stats = PriceStatistics::compute(&request(), &series).unwrap();

        assert_eq!(stats.period, 5);
        assert_eq!(stats.current_price, dec!(104));
        assert_eq!(stats.highest_price, dec!(107));
        assert_eq!(stats.lowest_price, dec!(100));
        assert_eq!(stats.average_price, dec!(103.8));
        assert_eq!(stats.price_change, dec!(4));
        assert_eq!(stats.price_change_percent, dec!(4));
        assert_eq!(stats.total_volume, dec!(150));
        assert_eq!(stats.average_volume, dec!(30));
        let expected = dec!(5.36).sqrt().unwrap();
        assert!((stats.volatility - expected).abs() < dec!(0.000000001));
        assert_eq!(stats.start_time, series[0].timestamp);
        assert_eq!(stats.end_time, series[4].timestamp);
    }

    #[test]
    fn test_statistics_on_empty_series_is_no_data() {
        let err = PriceStatistics::compute(&request(), &[]).unwrap_err();
        assert!(matches!(err, GatewayError::NoData(_)));
    }

    #[test]
    fn test_zero_first_close_gives_zero_percent_change() {
        let series = candles(&[dec!(0), dec!(5)], &[dec!(1), dec!(1)]);
        let stats = PriceStatistics::compute(&request(), &series).unwrap();
        assert_eq!(stats.price_change, dec!(5));
        assert_eq!(stats.price_change_percent, Decimal::ZERO);
    }

    #[test]
    fn test_single_value_volatility_is_zero() {
        assert_eq!(volatility(&[dec!(42)]), Decimal::ZERO);
    }

    #[test]
    fn test_compare_prices() {
        let tickers = HashMap::from([
            (Exchange::Binance, ticker(Exchange::Binance, dec!(100))),
            (Exchange::Kraken, ticker(Exchange::Kraken, dec!(102))),
            (Exchange::Coinbase, ticker(Exchange::Coinbase, dec!(101))),
        ]);
        let comparison = PriceComparison::compute("BTC/USDT", &tickers).unwrap();

        assert_eq!(comparison.lowest.exchange, Exchange::Binance);
        assert_eq!(comparison.highest.exchange, Exchange::Kraken);
        assert_eq!(comparison.spread_percent, dec!(2));
        assert_eq!(comparison.prices.len(), 3);
    }

    #[test]
    fn test_compare_prices_needs_two_exchanges() {
        let tickers = HashMap::from([(Exchange::Binance, ticker(Exchange::Binance, dec!(100)))]);
        assert!(matches!(
            PriceComparison::compute("BTC/USDT", &tickers),
            Err(GatewayError::NoData(_))
        ));
    }

    #[test]
    fn test_moving_average_signals() {
        let ones = [dec!(1); 6];

        // rising: short SMA above long, price above short
        let rising = candles(&[dec!(1), dec!(2), dec!(3), dec!(4), dec!(5), dec!(6)], &ones);
        let ma = MovingAverageSignal::compute(&request(), &rising, 2, 4).unwrap();
        assert_eq!(ma.short_sma, dec!(5.5));
        assert_eq!(ma.long_sma, dec!(4.5));
        assert_eq!(ma.signal, Signal::StrongBuy);

        // short above long but last close dipped below short
        let dip = candles(&[dec!(1), dec!(1), dec!(1), dec!(10), dec!(8), dec!(8.5)], &ones);
        let ma = MovingAverageSignal::compute(&request(), &dip, 3, 6).unwrap();
        assert_eq!(ma.signal, Signal::Buy);

        // falling: short below long, price below short
        let falling = candles(&[dec!(6), dec!(5), dec!(4), dec!(3), dec!(2), dec!(1)], &ones);
        let ma = MovingAverageSignal::compute(&request(), &falling, 2, 4).unwrap();
        assert_eq!(ma.signal, Signal::StrongSell);

        // flat: short equals long, price equals short
        let flat = candles(&[dec!(3); 6], &ones);
        let ma = MovingAverageSignal::compute(&request(), &flat, 2, 4).unwrap();
        assert_eq!(ma.signal, Signal::Sell);
    }

    #[test]
    fn test_moving_average_rejects_bad_windows_and_short_series() {
        let series = candles(&[dec!(1), dec!(2), dec!(3)], &[dec!(1); 3]);

        for (short, long) in [(0, 2), (3, 3), (4, 2)] {
            assert!(matches!(
                MovingAverageSignal::compute(&request(), &series, short, long),
                Err(GatewayError::Validation(_))
            ));
        }
        assert!(matches!(
            MovingAverageSignal::compute(&request(), &series, 2, 5),
            Err(GatewayError::NoData(_))
        ));
    }

    #[test]
    fn test_volume_analysis_flags_spikes() {
        let series = candles(
            &[dec!(1); 5],
            &[dec!(10), dec!(10), dec!(40), dec!(10), dec!(30)],
        );
        let analysis = VolumeAnalysis::compute(&request(), &series).unwrap();

        assert_eq!(analysis.average_volume, dec!(20));
        assert_eq!(analysis.current_volume, dec!(30));
        assert_eq!(analysis.current_percent_of_average, dec!(150));
        assert_eq!(analysis.spikes.len(), 1);
        assert_eq!(analysis.spikes[0].volume, dec!(40));
        assert_eq!(analysis.spikes[0].percent_of_average, dec!(200));
    }
}
