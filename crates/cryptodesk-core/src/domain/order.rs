//! 주문 타입.
//!
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderType` - 주문 유형 (거래소 표기: market, limit, stopLoss ...)
//! - `OrderStatus` - 주문 상태
//! - `TradeRecord` - 체결/주문 기록 (실거래와 시뮬레이션 공용)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// 반대 방향.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(DomainError::InvalidInput(
                "Side must be 'buy' or 'sell'".to_string(),
            )),
        }
    }
}

/// 주문 유형 (거래소 camelCase 표기).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// 시장가 - 즉시 체결
    Market,
    /// 지정가
    Limit,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
}

impl OrderType {
    pub const ALL: [OrderType; 6] = [
        OrderType::Market,
        OrderType::Limit,
        OrderType::StopLoss,
        OrderType::StopLossLimit,
        OrderType::TakeProfit,
        OrderType::TakeProfitLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::StopLoss => "stopLoss",
            OrderType::StopLossLimit => "stopLossLimit",
            OrderType::TakeProfit => "takeProfit",
            OrderType::TakeProfitLimit => "takeProfitLimit",
        }
    }

    /// 지정 가격이 필요한 유형인지.
    pub fn requires_price(&self) -> bool {
        matches!(
            self,
            OrderType::Limit | OrderType::StopLossLimit | OrderType::TakeProfitLimit
        )
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                DomainError::InvalidInput(format!(
                    "Order type must be one of: {}",
                    OrderType::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }
}

/// 주문 상태.
///
/// 상태는 거래소가 알려주는 값이며 로컬에서 계산하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// 거래소 상태 문자열 변환.
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "new" | "open" | "awaitingTrigger" => OrderStatus::Open,
            "partiallyFilled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "canceled" | "cancelled" | "cancelledAuction" | "expired" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// 최종 상태 여부.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 주문/체결 기록.
///
/// 필드명은 하나로 고정합니다. 외부 표기(`orderId`, `filledAmount` 등)와의 변환은
/// 직렬화 경계에서만 수행합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub exchange_order_id: String,
    /// `BTC-EUR` 형식
    pub market: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
    pub filled_amount: f64,
    pub filled_price: Option<f64>,
    pub status: OrderStatus,
    pub fee: f64,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    /// 마켓의 base 심볼 (BTC-EUR → BTC).
    pub fn symbol(&self) -> &str {
        self.market.split('-').next().unwrap_or(&self.market)
    }

    /// 체결 명목 금액.
    pub fn notional(&self) -> f64 {
        self.filled_amount * self.filled_price.or(self.price).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_type_round_trip_names() {
        for t in OrderType::ALL {
            assert_eq!(t.as_str().parse::<OrderType>().unwrap(), t);
        }
        assert!("stop-loss".parse::<OrderType>().is_err());
        assert_eq!(
            serde_json::to_string(&OrderType::StopLossLimit).unwrap(),
            "\"stopLossLimit\""
        );
    }

    #[test]
    fn test_requires_price() {
        assert!(OrderType::Limit.requires_price());
        assert!(!OrderType::Market.requires_price());
        assert!(!OrderType::StopLoss.requires_price());
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn test_status_from_exchange() {
        assert_eq!(OrderStatus::from_exchange("new"), OrderStatus::Open);
        assert_eq!(OrderStatus::from_exchange("canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_exchange("filled"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_exchange("??"), OrderStatus::Pending);
        assert!(OrderStatus::Rejected.is_final());
        assert!(!OrderStatus::Open.is_final());
    }

    #[test]
    fn test_trade_record_symbol() {
        let record = TradeRecord {
            exchange_order_id: "SIM-1".into(),
            market: "ETH-EUR".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            amount: 2.0,
            price: None,
            filled_amount: 2.0,
            filled_price: Some(1500.0),
            status: OrderStatus::Filled,
            fee: 0.0,
            simulated: true,
            created_at: Utc::now(),
        };
        assert_eq!(record.symbol(), "ETH");
        assert_eq!(record.notional(), 3000.0);
    }
}
