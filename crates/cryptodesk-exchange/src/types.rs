//! 게이트웨이 입출력 타입.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cryptodesk_core::services::market::value_as_f64;
use cryptodesk_core::PRICE_DECIMALS;

use crate::error::{ErrorKind, ExchangeError, ExchangeResult};
use crate::simulated::SimulatedOrder;

/// 주문 요청.
///
/// 알려지지 않은 필드(`stop_loss_price` 등)는 `extra`에 모여 그대로 거래소에 전달됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub market: String,
    pub side: String,
    pub order_type: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderPayload {
    pub fn new(market: impl Into<String>, side: impl Into<String>, order_type: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            side: side.into(),
            order_type: order_type.into(),
            amount: None,
            price: None,
            extra: Map::new(),
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// 추가 파라미터. `None`은 무시합니다.
    pub fn with_extra(mut self, key: &str, value: Option<impl Into<Value>>) -> Self {
        if let Some(value) = value {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }

    /// 거래소 전송용 body.
    ///
    /// 수량, 가격, 숫자 extra는 문자열로 변환하고 null extra는 제외합니다.
    pub fn to_api_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("market".into(), Value::from(self.market.clone()));
        body.insert("side".into(), Value::from(self.side.clone()));
        body.insert("orderType".into(), Value::from(self.order_type.clone()));
        if let Some(amount) = self.amount {
            body.insert("amount".into(), Value::from(decimal_string(amount)));
        }
        if let Some(price) = self.price {
            body.insert("price".into(), Value::from(decimal_string(price)));
        }
        for (key, value) in &self.extra {
            match value {
                Value::Null => {}
                Value::Number(n) => {
                    let text = match n.as_f64() {
                        Some(f) if n.is_f64() => decimal_string(f),
                        _ => n.to_string(),
                    };
                    body.insert(key.clone(), Value::from(text));
                }
                other => {
                    body.insert(key.clone(), other.clone());
                }
            }
        }
        Value::Object(body)
    }
}

/// 8자리 반올림 후 뒤쪽 0을 제거한 10진 문자열.
///
/// `0.1 + 0.2` 같은 이진 부동소수점 잔여 오차가 거래소로 넘어가지 않습니다.
fn decimal_string(value: f64) -> String {
    Decimal::from_f64(value)
        .map(|d| {
            d.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointNearestEven)
                .normalize()
                .to_string()
        })
        .unwrap_or_else(|| value.to_string())
}

/// 주문 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrderOutcome {
    /// dry-run/demo 시뮬레이션
    Simulated(SimulatedOrder),
    /// 거래소 원본 응답
    Live(Value),
}

impl OrderOutcome {
    pub fn is_simulated(&self) -> bool {
        matches!(self, OrderOutcome::Simulated(_))
    }

    pub fn order_id(&self) -> Option<String> {
        match self {
            OrderOutcome::Simulated(order) => Some(order.order_id.clone()),
            OrderOutcome::Live(value) => value.get("orderId").and_then(Value::as_str).map(str::to_string),
        }
    }

    /// 거래소 상태 문자열.
    pub fn status(&self) -> String {
        match self {
            OrderOutcome::Simulated(order) => order.status.clone(),
            OrderOutcome::Live(value) => value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    /// JSON 표현.
    pub fn to_value(&self) -> Value {
        match self {
            OrderOutcome::Simulated(order) => serde_json::to_value(order).unwrap_or(Value::Null),
            OrderOutcome::Live(value) => value.clone(),
        }
    }
}

/// 통화별 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub symbol: String,
    pub available: f64,
    pub in_order: f64,
}

impl Balance {
    /// 거래소 잔고 배열을 변환합니다. 숫자 문자열은 f64로 변환됩니다.
    pub fn parse_list(value: &Value) -> ExchangeResult<Vec<Balance>> {
        let entries = value
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("Balance response is not an array".to_string()))?;

        entries
            .iter()
            .map(|entry| {
                let symbol = entry
                    .get("symbol")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ExchangeError::Parse("Balance entry without symbol".to_string()))?;
                let number = |key: &str| entry.get(key).and_then(value_as_f64).unwrap_or(0.0);
                Ok(Balance {
                    symbol: symbol.to_string(),
                    available: number("available"),
                    in_order: number("inOrder"),
                })
            })
            .collect()
    }
}

/// 배치 주문의 개별 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOrderResult {
    Success { order: OrderOutcome },
    Error { error: String, order: OrderPayload },
}

/// 연결 테스트 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTest {
    /// "success" 또는 "error"
    pub status: &'static str,
    pub message: String,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ConnectionTest {
    pub(crate) fn success(server_time: Option<i64>) -> Self {
        Self {
            status: "success",
            message: "API connection and authentication successful".to_string(),
            authenticated: true,
            server_time,
            kind: None,
        }
    }

    pub(crate) fn failure(message: String, kind: ErrorKind) -> Self {
        Self {
            status: "error",
            message,
            authenticated: false,
            server_time: None,
            kind: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
