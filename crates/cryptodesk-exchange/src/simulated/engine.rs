//! 시뮬레이션 엔진 구현.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use cryptodesk_core::{OrderType, SimulationConfig, TradingMode};

use crate::types::OrderPayload;

/// 시뮬레이션 주문 ID 접두사
const ORDER_ID_PREFIX: &str = "SIM-";

/// 거래소 주문 응답 형식의 시뮬레이션 주문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedOrder {
    pub order_id: String,
    pub market: String,
    pub side: String,
    pub order_type: String,
    pub amount: String,
    pub price: Option<String>,
    /// "filled" (시장가) 또는 "open"
    pub status: String,
    pub filled_amount: String,
    pub filled_price: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub fee: String,
    pub fee_currency: String,
    pub settlement: String,
    pub simulated: bool,
    #[serde(rename = "trading_mode")]
    pub trading_mode: TradingMode,
}

/// 거래소 잔고 응답 형식의 시뮬레이션 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedBalanceEntry {
    pub symbol: String,
    pub available: String,
    pub in_order: String,
}

/// 시뮬레이션 엔진.
///
/// 상태를 갖지 않으며 설정만 보관합니다.
#[derive(Debug, Clone, Default)]
pub struct SimulationEngine {
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn new_order_id() -> String {
        let token = Uuid::new_v4().simple().to_string();
        format!("{}{}", ORDER_ID_PREFIX, token[..8].to_uppercase())
    }

    /// 주문 응답 시뮬레이션.
    ///
    /// 시장가 주문은 즉시 전량 체결(가격 미지정 시 기본 체결가),
    /// 그 외 주문은 미체결 `open` 상태가 됩니다.
    pub fn simulate_order_response(&self, order: &OrderPayload, mode: TradingMode) -> SimulatedOrder {
        let order_id = Self::new_order_id();
        let amount = order.amount.unwrap_or(0.0);
        let is_market = order.order_type == OrderType::Market.as_str();

        let (status, filled_amount, filled_price) = if is_market {
            let fill = order.price.unwrap_or(self.config.default_fill_price);
            ("filled", amount, Some(fill))
        } else {
            ("open", 0.0, None)
        };

        let now = Utc::now();
        let response = SimulatedOrder {
            order_id,
            market: order.market.clone(),
            side: order.side.clone(),
            order_type: order.order_type.clone(),
            amount: amount.to_string(),
            price: order.price.map(|p| p.to_string()),
            status: status.to_string(),
            filled_amount: filled_amount.to_string(),
            filled_price: filled_price.map(|p| p.to_string()),
            created: now,
            updated: now,
            fee: self.config.fee_rate.clone(),
            fee_currency: self.config.fee_currency.clone(),
            settlement: "instant".to_string(),
            simulated: true,
            trading_mode: mode,
        };

        info!(
            mode = %mode,
            order_id = %response.order_id,
            market = %response.market,
            side = %response.side,
            status = %response.status,
            "Simulated order"
        );

        response
    }

    /// 설정된 시뮬레이션 잔고.
    pub fn simulate_balance_response(&self) -> Vec<SimulatedBalanceEntry> {
        self.config
            .balances
            .iter()
            .map(|b| SimulatedBalanceEntry {
                symbol: b.symbol.clone(),
                available: b.available.clone(),
                in_order: "0".to_string(),
            })
            .collect()
    }

    /// 취소 응답 시뮬레이션.
    pub fn simulate_cancel_response(&self, order_id: &str) -> Value {
        json!({
            "orderId": order_id,
            "status": "dry_run",
            "cancelled": true,
            "simulated": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SimulationEngine {
        SimulationEngine::new(SimulationConfig::default())
    }

    #[test]
    fn test_market_order_fills_at_default_price() {
        let order = OrderPayload::new("BTC-EUR", "buy", "market").with_amount(0.01);
        let response = engine().simulate_order_response(&order, TradingMode::DryRun);

        assert!(response.order_id.starts_with("SIM-"));
        assert_eq!(response.order_id.len(), 12);
        assert!(response.order_id[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(response.status, "filled");
        assert_eq!(response.filled_amount, "0.01");
        assert_eq!(response.filled_price.as_deref(), Some("45000"));
        assert_eq!(response.price, None);
        assert!(response.simulated);
    }

    #[test]
    fn test_limit_order_stays_open() {
        let order = OrderPayload::new("ETH-EUR", "sell", "limit")
            .with_amount(1.5)
            .with_price(2500.0);
        let response = engine().simulate_order_response(&order, TradingMode::Demo);

        assert_eq!(response.status, "open");
        assert_eq!(response.filled_amount, "0");
        assert_eq!(response.filled_price, None);
        assert_eq!(response.price.as_deref(), Some("2500"));
        assert_eq!(response.trading_mode, TradingMode::Demo);
    }

    #[test]
    fn test_order_ids_are_unique() {
        let order = OrderPayload::new("BTC-EUR", "buy", "market").with_amount(1.0);
        let e = engine();
        let a = e.simulate_order_response(&order, TradingMode::DryRun);
        let b = e.simulate_order_response(&order, TradingMode::DryRun);
        assert_ne!(a.order_id, b.order_id);
    }

    #[test]
    fn test_serialized_field_names() {
        let order = OrderPayload::new("BTC-EUR", "buy", "market").with_amount(0.5);
        let value = serde_json::to_value(engine().simulate_order_response(&order, TradingMode::DryRun)).unwrap();

        assert!(value.get("orderId").is_some());
        assert!(value.get("filledAmount").is_some());
        assert_eq!(value["feeCurrency"], "EUR");
        assert_eq!(value["settlement"], "instant");
        assert_eq!(value["trading_mode"], "dry_run");
    }

    #[test]
    fn test_balance_and_cancel() {
        let balances = engine().simulate_balance_response();
        assert_eq!(balances.len(), 3);
        assert_eq!(balances[0].symbol, "EUR");
        assert_eq!(balances[0].available, "10000.00");

        let cancel = engine().simulate_cancel_response("SIM-1234ABCD");
        assert_eq!(cancel["status"], "dry_run");
        assert_eq!(cancel["cancelled"], true);
    }
}
