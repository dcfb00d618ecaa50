//! 시장 데이터 가공 및 지표.
//!
//! 거래소 응답은 숫자를 문자열로 보내므로 여기서 f64로 변환합니다.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// f64로 변환할 ticker 필드.
const NUMERIC_TICKER_KEYS: [&str; 10] = [
    "price", "last", "high", "low", "volume", "volumeQuote", "bid", "ask", "bestBid", "bestAsk",
];

/// 이 값보다 큰 timestamp는 밀리초로 간주.
const MILLIS_THRESHOLD: f64 = 1_000_000_000_000.0;

/// 문자열 또는 숫자 JSON 값을 f64로 변환.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ticker 숫자 필드를 f64로 변환하고 스프레드를 추가합니다.
///
/// 변환할 수 없는 숫자 필드는 0.0이 됩니다.
pub fn process_ticker_data(raw: &Map<String, Value>) -> Map<String, Value> {
    let mut processed: Map<String, Value> = raw
        .iter()
        .map(|(key, value)| {
            if NUMERIC_TICKER_KEYS.contains(&key.as_str()) {
                (key.clone(), Value::from(value_as_f64(value).unwrap_or(0.0)))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect();

    let bid = processed.get("bid").and_then(Value::as_f64);
    let ask = processed.get("ask").and_then(Value::as_f64);
    if let (Some(bid), Some(ask)) = (bid, ask) {
        let spread = ask - bid;
        let spread_percentage = if ask > 0.0 { spread / ask * 100.0 } else { 0.0 };
        processed.insert("spread".into(), Value::from(spread));
        processed.insert("spread_percentage".into(), Value::from(spread_percentage));
    }

    processed
}

/// 표준화된 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 거래소 원본 timestamp
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub datetime: Option<DateTime<Utc>>,
}

/// `[timestamp, open, high, low, close, volume]` 배열 목록을 캔들로 변환.
///
/// 6개 미만이거나 숫자로 변환할 수 없는 항목은 건너뜁니다.
pub fn process_candle_data(raw: &[Value]) -> Vec<Candle> {
    raw.iter()
        .filter_map(|candle| {
            let fields = candle.as_array()?;
            if fields.len() < 6 {
                return None;
            }
            let numbers: Option<Vec<f64>> = fields[..6].iter().map(value_as_f64).collect();
            let n = numbers?;

            let seconds = if n[0] > MILLIS_THRESHOLD { n[0] / 1000.0 } else { n[0] };
            let datetime = Utc.timestamp_opt(seconds as i64, 0).single();

            Some(Candle {
                timestamp: n[0],
                open: n[1],
                high: n[2],
                low: n[3],
                close: n[4],
                volume: n[5],
                datetime,
            })
        })
        .collect()
}

/// 가격 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Up,
    Down,
    Neutral,
}

/// 가격 변화.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub absolute_change: f64,
    pub percentage_change: f64,
    pub direction: PriceDirection,
}

/// 가격 변화 계산.
pub fn calculate_price_change(current_price: f64, previous_price: f64) -> PriceChange {
    let absolute_change = current_price - previous_price;
    let percentage_change = if previous_price > 0.0 {
        absolute_change / previous_price * 100.0
    } else {
        0.0
    };
    let direction = if absolute_change > 0.0 {
        PriceDirection::Up
    } else if absolute_change < 0.0 {
        PriceDirection::Down
    } else {
        PriceDirection::Neutral
    };

    PriceChange {
        absolute_change,
        percentage_change,
        direction,
    }
}

/// 알림 조건.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
    /// 0.1% 허용 오차
    Equal,
}

/// 가격 알림.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub market: String,
    pub condition: AlertCondition,
    pub price: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 발동된 알림 목록.
pub fn check_price_alerts<'a>(alerts: &'a [PriceAlert], market: &str, current_price: f64) -> Vec<&'a PriceAlert> {
    alerts
        .iter()
        .filter(|alert| alert.active && alert.market == market)
        .filter(|alert| match alert.condition {
            AlertCondition::Above => current_price > alert.price,
            AlertCondition::Below => current_price < alert.price,
            AlertCondition::Equal => (current_price - alert.price).abs() < alert.price * 0.001,
        })
        .collect()
}

/// 단순 이동평균. 데이터가 부족하면 0.
pub fn calculate_moving_average(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period {
        return 0.0;
    }
    let recent = &prices[prices.len() - period..];
    recent.iter().sum::<f64>() / period as f64
}

/// RSI.
///
/// 데이터가 `period + 1`개 미만이면 중립값 50, 손실이 없으면 100.
pub fn calculate_rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &changes[changes.len() - period..];

    let avg_gain = recent.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let avg_loss = recent.iter().filter(|c| **c < 0.0).map(|c| c.abs()).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// 추세.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

/// 단기/장기 이동평균 비교로 추세 판단 (±2%).
pub fn detect_trend(prices: &[f64], short_period: usize, long_period: usize) -> Trend {
    if prices.len() < long_period {
        return Trend::Neutral;
    }

    let short_ma = calculate_moving_average(prices, short_period);
    let long_ma = calculate_moving_average(prices, long_period);

    if short_ma > long_ma * 1.02 {
        Trend::Bullish
    } else if short_ma < long_ma * 0.98 {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_ticker_data() {
        let raw = json!({"market": "BTC-EUR", "bid": "99", "ask": "100", "volume": "abc"});
        let processed = process_ticker_data(raw.as_object().unwrap());

        assert_eq!(processed["market"], "BTC-EUR");
        assert_eq!(processed["bid"], 99.0);
        assert_eq!(processed["volume"], 0.0);
        assert_eq!(processed["spread"], 1.0);
        assert_eq!(processed["spread_percentage"], 1.0);
    }

    #[test]
    fn test_process_candle_data() {
        let raw = vec![
            json!([1700000000000i64, "1", "2", "0.5", "1.5", "10"]),
            json!([1700000000, 1, 2, 0.5, 1.5, 10]),
            json!(["bad"]),
        ];
        let candles = process_candle_data(&raw);

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[0].datetime, candles[1].datetime);
        assert_eq!(candles[1].datetime.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_price_change() {
        let up = calculate_price_change(110.0, 100.0);
        assert_eq!(up.direction, PriceDirection::Up);
        assert_eq!(up.percentage_change, 10.0);
        assert_eq!(calculate_price_change(100.0, 100.0).direction, PriceDirection::Neutral);
        assert_eq!(calculate_price_change(90.0, 0.0).percentage_change, 0.0);
    }

    #[test]
    fn test_price_alerts() {
        let alerts = vec![
            PriceAlert {
                market: "BTC-EUR".into(),
                condition: AlertCondition::Above,
                price: 40000.0,
                active: true,
            },
            PriceAlert {
                market: "BTC-EUR".into(),
                condition: AlertCondition::Equal,
                price: 45010.0,
                active: true,
            },
            PriceAlert {
                market: "BTC-EUR".into(),
                condition: AlertCondition::Below,
                price: 50000.0,
                active: false,
            },
            PriceAlert {
                market: "ETH-EUR".into(),
                condition: AlertCondition::Above,
                price: 1.0,
                active: true,
            },
        ];

        let triggered = check_price_alerts(&alerts, "BTC-EUR", 45000.0);
        assert_eq!(triggered.len(), 2);
    }

    #[test]
    fn test_moving_average_and_rsi() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(calculate_moving_average(&prices, 3), 4.0);
        assert_eq!(calculate_moving_average(&prices, 10), 0.0);

        assert_eq!(calculate_rsi(&prices, 14), 50.0);
        assert_eq!(calculate_rsi(&prices, 4), 100.0);

        let mixed = [10.0, 11.0, 10.0, 11.0, 10.0];
        assert_eq!(calculate_rsi(&mixed, 4), 50.0);
    }

    #[test]
    fn test_detect_trend() {
        let rising: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_eq!(detect_trend(&rising, 5, 20), Trend::Bullish);

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(detect_trend(&falling, 5, 20), Trend::Bearish);

        assert_eq!(detect_trend(&[1.0; 20], 5, 20), Trend::Neutral);
        assert_eq!(detect_trend(&rising[..10], 5, 20), Trend::Neutral);
    }
}
