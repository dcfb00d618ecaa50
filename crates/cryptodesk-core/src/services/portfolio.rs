//! 포트폴리오 손익 및 리밸런싱.

use serde::Serialize;
use std::collections::HashMap;

use crate::domain::{PositionSnapshot, Side};

/// 리밸런싱 제안 최소 비중 차이 (1%p)
const REBALANCE_THRESHOLD: f64 = 0.01;

/// 포지션별 성과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPerformance {
    pub symbol: String,
    pub unrealized_pnl: f64,
    pub percentage_change: f64,
}

/// 포트폴리오 성과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    pub total_return_percentage: f64,
    pub unrealized_pnl: f64,
    pub positions_performance: Vec<PositionPerformance>,
    /// 현재 잔고 + 미실현 손익
    pub total_value: f64,
}

/// 포트폴리오 성과 계산.
pub fn calculate_portfolio_performance(
    initial_balance: f64,
    current_balance: f64,
    positions: &[PositionSnapshot],
) -> PortfolioPerformance {
    let positions_performance: Vec<PositionPerformance> = positions
        .iter()
        .map(|p| PositionPerformance {
            symbol: p.symbol.clone(),
            unrealized_pnl: p.unrealized_pnl(),
            percentage_change: p.percentage_change(),
        })
        .collect();

    let unrealized_pnl: f64 = positions_performance.iter().map(|p| p.unrealized_pnl).sum();

    let total_return_percentage = if initial_balance > 0.0 {
        (current_balance - initial_balance) / initial_balance * 100.0
    } else {
        0.0
    };

    PortfolioPerformance {
        total_return_percentage,
        unrealized_pnl,
        positions_performance,
        total_value: current_balance + unrealized_pnl,
    }
}

/// 신규 체결을 포지션 목록에 반영.
///
/// - 매수: 기존 포지션이 있으면 가중평균 단가로 합산, 없으면 신규 생성
/// - 매도: 수량 차감, 0이 되면 제거 (없는 포지션 매도는 무시)
pub fn update_portfolio_positions(
    existing: &[PositionSnapshot],
    symbol: &str,
    side: Side,
    amount: f64,
    price: f64,
) -> Vec<PositionSnapshot> {
    let mut found = false;
    let mut updated = Vec::with_capacity(existing.len() + 1);

    for position in existing {
        if position.symbol != symbol {
            updated.push(position.clone());
            continue;
        }

        found = true;
        match side {
            Side::Buy => {
                let new_amount = position.amount + amount;
                let new_average = if new_amount > 0.0 {
                    (position.amount * position.average_price + amount * price) / new_amount
                } else {
                    position.average_price
                };
                updated.push(PositionSnapshot {
                    amount: new_amount,
                    average_price: new_average,
                    ..position.clone()
                });
            }
            Side::Sell => {
                let remaining = (position.amount - amount).max(0.0);
                if remaining > 0.0 {
                    updated.push(PositionSnapshot {
                        amount: remaining,
                        ..position.clone()
                    });
                }
            }
        }
    }

    if !found && side == Side::Buy {
        updated.push(PositionSnapshot::new(symbol, amount, price, price));
    }

    updated
}

/// 단일 포지션 손익.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPnl {
    pub unrealized_pnl: f64,
    pub percentage_change: f64,
    pub market_value: f64,
}

/// 단일 포지션 손익 계산.
pub fn calculate_position_pnl(position: &PositionSnapshot) -> PositionPnl {
    PositionPnl {
        unrealized_pnl: position.unrealized_pnl(),
        percentage_change: position.percentage_change(),
        market_value: position.market_value(),
    }
}

/// 리밸런싱 제안.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceSuggestion {
    pub symbol: String,
    pub action: Side,
    /// 목표 비중 (%)
    pub target_percentage: f64,
    /// 현재 비중 (%)
    pub current_percentage: f64,
    /// 조정 금액 (절대값)
    pub value_difference: f64,
    pub description: String,
}

/// 목표 비중 대비 리밸런싱 제안.
///
/// `target_allocation`은 0.0~1.0 비중. 차이가 1%p 이하인 자산은 제외합니다.
/// 결과는 심볼 순으로 정렬됩니다.
pub fn get_rebalance_suggestions(
    total_value: f64,
    positions: &[PositionSnapshot],
    target_allocation: &HashMap<String, f64>,
) -> Vec<RebalanceSuggestion> {
    let current_allocation: HashMap<&str, f64> = positions
        .iter()
        .map(|p| {
            let weight = if total_value > 0.0 {
                p.market_value() / total_value
            } else {
                0.0
            };
            (p.symbol.as_str(), weight)
        })
        .collect();

    let mut targets: Vec<(&String, &f64)> = target_allocation.iter().collect();
    targets.sort_by(|a, b| a.0.cmp(b.0));

    targets
        .into_iter()
        .filter_map(|(symbol, &target)| {
            let current = current_allocation.get(symbol.as_str()).copied().unwrap_or(0.0);
            let difference = target - current;
            if difference.abs() <= REBALANCE_THRESHOLD {
                return None;
            }

            let value_difference = (total_value * target - total_value * current).abs();
            let action = if difference > 0.0 { Side::Buy } else { Side::Sell };
            let verb = match action {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            };

            Some(RebalanceSuggestion {
                symbol: symbol.clone(),
                action,
                target_percentage: target * 100.0,
                current_percentage: current * 100.0,
                value_difference,
                description: format!("{} {:.2} EUR worth of {}", verb, value_difference, symbol),
            })
        })
        .collect()
}
