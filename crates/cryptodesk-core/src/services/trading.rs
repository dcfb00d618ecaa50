//! 주문 전 점검 및 보조 주문 생성.

use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::{OrderType, Side};

/// 거래 수수료율 (0.25%)
pub const TRADING_FEE_RATE: f64 = 0.0025;

/// 기본 최소 주문 수량
const DEFAULT_MIN_ORDER_SIZE: f64 = 0.001;

/// 마켓별 최소 주문 수량.
pub fn min_order_size(market: &str) -> f64 {
    match market {
        "BTC-EUR" => 0.001,
        "ETH-EUR" => 0.01,
        "ADA-EUR" => 1.0,
        "DOT-EUR" => 0.1,
        _ => DEFAULT_MIN_ORDER_SIZE,
    }
}

/// 최소 주문 수량 검사.
pub fn validate_order_size(market: &str, amount: f64) -> Result<(), String> {
    let min_size = min_order_size(market);
    if amount < min_size {
        return Err(format!(
            "Order size {} is below minimum {} for {}",
            amount, min_size, market
        ));
    }
    Ok(())
}

/// 주문 비용 내역.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderFees {
    pub base_cost: f64,
    pub trading_fee: f64,
    pub total_cost: f64,
    /// 수수료율 (%)
    pub fee_percentage: f64,
}

/// 수수료 포함 주문 비용.
pub fn calculate_order_fees(amount: f64, price: f64) -> OrderFees {
    let base_cost = amount * price;
    let trading_fee = base_cost * TRADING_FEE_RATE;
    OrderFees {
        base_cost,
        trading_fee,
        total_cost: base_cost + trading_fee,
        fee_percentage: TRADING_FEE_RATE * 100.0,
    }
}

/// 잔고 점검 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceCheck {
    pub sufficient: bool,
    pub message: String,
    pub required: f64,
    pub available: f64,
}

/// 주문에 필요한 잔고 확인.
///
/// 매수는 quote 통화(`BTC-EUR`의 EUR), 매도는 base 통화를 확인합니다.
/// `balances`는 `(symbol, available)` 목록입니다.
pub fn check_sufficient_balance(
    balances: &[(String, f64)],
    market: &str,
    side: Side,
    amount: f64,
    price: f64,
) -> BalanceCheck {
    let (base, quote) = market.split_once('-').unwrap_or((market, "EUR"));
    let (currency, required) = match side {
        Side::Buy => (quote, amount * price),
        Side::Sell => (base, amount),
    };

    let available = balances
        .iter()
        .find(|(symbol, _)| symbol == currency)
        .map(|(_, available)| *available)
        .unwrap_or(0.0);

    let sufficient = available >= required;
    let message = if sufficient {
        "Sufficient balance available".to_string()
    } else {
        format!(
            "Insufficient {} balance. Required: {}, Available: {}",
            currency, required, available
        )
    };

    BalanceCheck {
        sufficient,
        message,
        required,
        available,
    }
}

/// 주 주문의 반대 방향 손절 주문 (stopLoss, 가격 트리거).
pub fn generate_stop_loss_order(market: &str, side: Side, amount: f64, price: f64, stop_loss_pct: f64) -> Value {
    let trigger_price = match side {
        Side::Buy => price * (1.0 - stop_loss_pct),
        Side::Sell => price * (1.0 + stop_loss_pct),
    };

    json!({
        "market": market,
        "side": side.opposite().as_str(),
        "orderType": OrderType::StopLoss.as_str(),
        "amount": amount,
        "triggerPrice": trigger_price,
        "triggerType": "price",
    })
}

/// 주 주문의 반대 방향 익절 지정가 주문.
pub fn generate_take_profit_order(market: &str, side: Side, amount: f64, price: f64, take_profit_pct: f64) -> Value {
    let take_profit_price = match side {
        Side::Buy => price * (1.0 + take_profit_pct),
        Side::Sell => price * (1.0 - take_profit_pct),
    };

    json!({
        "market": market,
        "side": side.opposite().as_str(),
        "orderType": OrderType::Limit.as_str(),
        "amount": amount,
        "price": take_profit_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_order_size() {
        assert!(validate_order_size("BTC-EUR", 0.001).is_ok());
        assert!(validate_order_size("ADA-EUR", 5.0).is_ok());

        let err = validate_order_size("ETH-EUR", 0.005).unwrap_err();
        assert_eq!(err, "Order size 0.005 is below minimum 0.01 for ETH-EUR");

        assert!(validate_order_size("XRP-EUR", 0.0005).is_err());
    }

    #[test]
    fn test_order_fees() {
        let fees = calculate_order_fees(2.0, 100.0);
        assert_eq!(fees.base_cost, 200.0);
        assert_eq!(fees.trading_fee, 0.5);
        assert_eq!(fees.total_cost, 200.5);
        assert_eq!(fees.fee_percentage, 0.25);
    }

    #[test]
    fn test_sufficient_balance_buy_uses_quote() {
        let balances = vec![("EUR".to_string(), 1000.0), ("BTC".to_string(), 0.5)];

        let ok = check_sufficient_balance(&balances, "BTC-EUR", Side::Buy, 0.01, 45000.0);
        assert!(ok.sufficient);
        assert_eq!(ok.required, 450.0);

        let short = check_sufficient_balance(&balances, "BTC-EUR", Side::Buy, 0.1, 45000.0);
        assert!(!short.sufficient);
        assert_eq!(short.message, "Insufficient EUR balance. Required: 4500, Available: 1000");
    }

    #[test]
    fn test_sufficient_balance_sell_uses_base() {
        let balances = vec![("BTC".to_string(), 0.5)];
        assert!(check_sufficient_balance(&balances, "BTC-EUR", Side::Sell, 0.5, 1.0).sufficient);

        let missing = check_sufficient_balance(&balances, "ETH-EUR", Side::Sell, 1.0, 1.0);
        assert!(!missing.sufficient);
        assert_eq!(missing.available, 0.0);
    }

    #[test]
    fn test_stop_loss_order() {
        let order = generate_stop_loss_order("BTC-EUR", Side::Buy, 0.1, 40000.0, 0.05);
        assert_eq!(order["side"], "sell");
        assert_eq!(order["orderType"], "stopLoss");
        assert_eq!(order["triggerPrice"], 38000.0);
        assert_eq!(order["triggerType"], "price");
    }

    #[test]
    fn test_take_profit_order() {
        let order = generate_take_profit_order("BTC-EUR", Side::Sell, 0.1, 40000.0, 0.25);
        assert_eq!(order["side"], "buy");
        assert_eq!(order["orderType"], "limit");
        assert_eq!(order["price"], 30000.0);
    }
}
