//! 포지션 스냅샷.

use serde::{Deserialize, Serialize};

/// 포트폴리오 내 단일 자산 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// base 심볼 (BTC, ETH ...)
    pub symbol: String,
    pub amount: f64,
    pub average_price: f64,
    #[serde(default)]
    pub current_price: f64,
}

impl PositionSnapshot {
    pub fn new(symbol: impl Into<String>, amount: f64, average_price: f64, current_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            average_price,
            current_price,
        }
    }

    /// 현재가 기준 평가 금액.
    pub fn market_value(&self) -> f64 {
        self.amount * self.current_price
    }

    /// 미실현 손익.
    pub fn unrealized_pnl(&self) -> f64 {
        self.amount * (self.current_price - self.average_price)
    }

    /// 평균 단가 대비 변화율 (%). 평균 단가가 0이면 0.
    pub fn percentage_change(&self) -> f64 {
        if self.average_price > 0.0 {
            (self.current_price - self.average_price) / self.average_price * 100.0
        } else {
            0.0
        }
    }
}
