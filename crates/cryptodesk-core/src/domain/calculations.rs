//! 주문 보조 계산.
//!
//! 손절/익절 가격, 마켓 형식 검증, 포지션 크기 계산 등 I/O 없는 순수 함수입니다.
//! 거래소로 전송되기 전 가격은 8자리로 반올림하여 부동소수점 잔여 오차를 제거합니다.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Map, Value};

use super::order::Side;
use super::position::PositionSnapshot;
use crate::error::{DomainError, DomainResult};

/// 전송 전 가격 반올림 자릿수.
pub const PRICE_DECIMALS: u32 = 8;

/// 응답에서 제거할 민감 필드.
const SENSITIVE_KEYS: [&str; 4] = ["apiKey", "signature", "timestamp", "internalData"];

/// 지정 자릿수 반올림 (half-even).
///
/// Decimal 변환이 불가능한 값(NaN, ∞)은 그대로 반환합니다.
pub fn round_to_step_size(amount: f64, decimals: u32) -> f64 {
    Decimal::from_f64(amount)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointNearestEven))
        .and_then(|d| d.to_f64())
        .unwrap_or(amount)
}

/// 8자리 반올림.
pub fn round8(value: f64) -> f64 {
    round_to_step_size(value, PRICE_DECIMALS)
}

/// 손절 가격.
///
/// 매수: `price × (1 − pct)`, 매도: `price × (1 + pct)`
///
/// ```
/// use cryptodesk_core::{calculate_stop_loss, Side};
///
/// assert_eq!(calculate_stop_loss(45000.0, Side::Buy, 0.05), 42750.0);
/// assert_eq!(calculate_stop_loss(45000.0, Side::Sell, 0.05), 47250.0);
/// ```
pub fn calculate_stop_loss(price: f64, side: Side, stop_loss_pct: f64) -> f64 {
    let result = match side {
        Side::Buy => price * (1.0 - stop_loss_pct),
        Side::Sell => price * (1.0 + stop_loss_pct),
    };
    round8(result)
}

/// 익절 가격.
///
/// 매수: `price × (1 + pct)`, 매도: `price × (1 − pct)`
pub fn calculate_take_profit(price: f64, side: Side, take_profit_pct: f64) -> f64 {
    let result = match side {
        Side::Buy => price * (1.0 + take_profit_pct),
        Side::Sell => price * (1.0 - take_profit_pct),
    };
    round8(result)
}

/// 포지션 평가 금액 합계.
pub fn calculate_portfolio_value(positions: &[PositionSnapshot]) -> f64 {
    positions.iter().map(PositionSnapshot::market_value).sum()
}

/// 변화율 (%). 기준값이 0이면 0.
pub fn calculate_percentage_change(old_value: f64, new_value: f64) -> f64 {
    if old_value == 0.0 {
        return 0.0;
    }
    (new_value - old_value) / old_value * 100.0
}

/// `BASE-QUOTE` 마켓 형식 검증.
///
/// 각 부분은 2~6자의 대문자 영숫자여야 합니다.
pub fn validate_market_pair(market: &str) -> bool {
    let mut parts = market.split('-');
    let (Some(base), Some(quote), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    [base, quote].iter().all(|part| {
        (2..=6).contains(&part.len())
            && part.chars().all(|c| c.is_ascii_alphanumeric())
            && part.chars().any(|c| c.is_ascii_uppercase())
            && !part.chars().any(|c| c.is_ascii_lowercase())
    })
}

/// 원시 주문 파라미터의 필수 필드 검사.
pub fn validate_order_parameters(params: &Map<String, Value>) -> DomainResult<()> {
    for field in ["market", "side", "orderType"] {
        if !params.contains_key(field) {
            return Err(DomainError::InvalidInput(format!(
                "Required field '{}' is missing",
                field
            )));
        }
    }
    Ok(())
}

/// 응답에서 민감 필드 제거.
pub fn sanitize_api_response(response: &Map<String, Value>) -> Map<String, Value> {
    response
        .iter()
        .filter(|(key, _)| !SENSITIVE_KEYS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// 일관된 응답 봉투.
pub fn format_response(data: Value, message: &str, is_error: bool) -> Value {
    if is_error {
        json!({ "status": "error", "message": message, "error": data })
    } else {
        json!({ "status": "success", "message": message, "data": data })
    }
}

/// 위험 금액 기준 포지션 크기.
///
/// `risk_amount / |entry − stop|`
pub fn calculate_position_size(risk_amount: f64, entry_price: f64, stop_loss_price: f64) -> DomainResult<f64> {
    if entry_price == stop_loss_price {
        return Err(DomainError::InvalidInput(
            "Entry price and stop loss price cannot be the same".to_string(),
        ));
    }
    Ok(risk_amount / (entry_price - stop_loss_price).abs())
}
