//! 리스크 평가.
//!
//! 포지션/포트폴리오 집중도, 신규 주문 리스크, 드로다운, 종합 리스크 점수를 계산합니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{PositionSnapshot, Side};

/// 법정화폐/스테이블코인 심볼. 암호화폐 비중 계산에서 제외됩니다.
pub const FIAT_SYMBOLS: [&str; 4] = ["EUR", "USD", "USDT", "USDC"];

/// 리스크 등급.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// 단일 포지션 리스크.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRisk {
    pub current_value: f64,
    pub position_cost: f64,
    pub unrealized_pnl: f64,
    /// 포트폴리오 대비 비중 (%)
    pub position_size_percentage: f64,
    pub unrealized_pnl_percentage: f64,
    pub risk_level: RiskLevel,
}

/// 포지션 리스크 계산.
///
/// 비중 30% 초과는 high, 15% 초과는 medium.
pub fn calculate_position_risk(position: &PositionSnapshot, portfolio_value: f64) -> PositionRisk {
    let current_value = position.market_value();
    let position_cost = position.amount * position.average_price;
    let unrealized_pnl = current_value - position_cost;

    let position_size_percentage = if portfolio_value > 0.0 {
        current_value / portfolio_value * 100.0
    } else {
        0.0
    };
    let unrealized_pnl_percentage = if position_cost > 0.0 {
        unrealized_pnl / position_cost * 100.0
    } else {
        0.0
    };

    let risk_level = if position_size_percentage > 30.0 {
        RiskLevel::High
    } else if position_size_percentage > 15.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    PositionRisk {
        current_value,
        position_cost,
        unrealized_pnl,
        position_size_percentage,
        unrealized_pnl_percentage,
        risk_level,
    }
}

/// 포트폴리오 리스크 요약.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRisk {
    pub overall_risk: RiskLevel,
    pub high_risk_positions: usize,
    pub medium_risk_positions: usize,
    pub total_exposure: f64,
    pub max_position_risk: f64,
    pub position_risks: Vec<PositionRisk>,
}

/// 마켓 정보가 붙은 포지션 (예: `BTC-EUR`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub market: String,
    pub amount: f64,
    pub average_price: f64,
}

/// 포트폴리오 리스크 계산.
///
/// `market_prices`에 가격이 없는 포지션은 제외합니다.
pub fn calculate_portfolio_risk(
    total_value: f64,
    positions: &[MarketPosition],
    market_prices: &HashMap<String, f64>,
) -> PortfolioRisk {
    let mut high = 0;
    let mut medium = 0;
    let mut total_exposure = 0.0;
    let mut max_position_risk: f64 = 0.0;
    let mut position_risks = Vec::new();

    for position in positions {
        let current_price = market_prices.get(&position.market).copied().unwrap_or(0.0);
        if current_price <= 0.0 {
            continue;
        }

        let snapshot = PositionSnapshot::new(
            position.market.clone(),
            position.amount,
            position.average_price,
            current_price,
        );
        let risk = calculate_position_risk(&snapshot, total_value);

        total_exposure += risk.position_size_percentage;
        max_position_risk = max_position_risk.max(risk.position_size_percentage);
        match risk.risk_level {
            RiskLevel::High => high += 1,
            RiskLevel::Medium => medium += 1,
            RiskLevel::Low => {}
        }
        position_risks.push(risk);
    }

    let overall_risk = if high > 2 || max_position_risk > 40.0 {
        RiskLevel::High
    } else if high > 0 || medium > 3 || max_position_risk > 25.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    PortfolioRisk {
        overall_risk,
        high_risk_positions: high,
        medium_risk_positions: medium,
        total_exposure,
        max_position_risk,
        position_risks,
    }
}

/// 신규 주문 리스크 검사 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRiskCheck {
    pub risk_level: RiskLevel,
    pub order_percentage: f64,
    pub sufficient_balance: bool,
    pub warnings: Vec<String>,
    pub current_exposure: f64,
    pub total_exposure: f64,
}

/// 신규 주문 리스크 검사.
pub fn check_order_risk(
    market: &str,
    amount: f64,
    market_price: f64,
    total_value: f64,
    available_balance: f64,
    positions: &[MarketPosition],
) -> OrderRiskCheck {
    let order_value = amount * market_price;
    let order_percentage = if total_value > 0.0 {
        order_value / total_value * 100.0
    } else {
        0.0
    };
    let sufficient_balance = available_balance >= order_value;

    let mut warnings = Vec::new();
    if order_percentage > 25.0 {
        warnings.push("Large order size - over 25% of portfolio".to_string());
    } else if order_percentage > 15.0 {
        warnings.push("Medium order size - over 15% of portfolio".to_string());
    }
    if !sufficient_balance {
        warnings.push("Insufficient balance for order".to_string());
    }

    let current_exposure = positions
        .iter()
        .find(|p| p.market == market)
        .map(|p| {
            if total_value > 0.0 {
                p.amount * market_price / total_value * 100.0
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    let total_exposure = current_exposure + order_percentage;
    if total_exposure > 40.0 {
        warnings.push(format!(
            "High concentration risk - {:.1}% in {}",
            total_exposure, market
        ));
    }

    let risk_level = if warnings.len() > 1 || order_percentage > 25.0 {
        RiskLevel::High
    } else if !warnings.is_empty() || order_percentage > 15.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    OrderRiskCheck {
        risk_level,
        order_percentage,
        sufficient_balance,
        warnings,
        current_exposure,
        total_exposure,
    }
}

/// 기본 리스크 비율 (%)
pub const DEFAULT_RISK_PERCENTAGE: f64 = 5.0;

/// 기본 손익비
pub const DEFAULT_PROFIT_RATIO: f64 = 2.0;

/// 리스크 비율(%) 기준 손절 가격.
pub fn calculate_stop_loss_price(entry_price: f64, side: Side, risk_percentage: f64) -> f64 {
    match side {
        Side::Buy => entry_price * (1.0 - risk_percentage / 100.0),
        Side::Sell => entry_price * (1.0 + risk_percentage / 100.0),
    }
}

/// 손익비 기준 익절 가격.
pub fn calculate_take_profit_price(
    entry_price: f64,
    side: Side,
    profit_ratio: f64,
    risk_percentage: f64,
) -> f64 {
    let profit_percentage = risk_percentage * profit_ratio;
    match side {
        Side::Buy => entry_price * (1.0 + profit_percentage / 100.0),
        Side::Sell => entry_price * (1.0 - profit_percentage / 100.0),
    }
}

/// 드로다운 검사 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownStatus {
    pub warning: bool,
    pub critical: bool,
    pub current_drawdown: f64,
    pub max_drawdown: f64,
    pub peak_value: f64,
    pub current_value: f64,
}

/// 기본 최대 드로다운 (%)
pub const DEFAULT_MAX_DRAWDOWN: f64 = 20.0;

/// 최대 드로다운 근접 여부.
///
/// `history`는 시간순 포트폴리오 총액. 경고는 한도의 80% 초과 시.
pub fn check_drawdown_limits(history: &[f64], max_drawdown: f64) -> DrawdownStatus {
    let current_value = history.last().copied().unwrap_or(0.0);
    if history.len() < 2 {
        return DrawdownStatus {
            warning: false,
            critical: false,
            current_drawdown: 0.0,
            max_drawdown,
            peak_value: current_value,
            current_value,
        };
    }

    let peak_value = history.iter().copied().fold(f64::MIN, f64::max);
    let current_drawdown = if peak_value > 0.0 {
        (peak_value - current_value) / peak_value * 100.0
    } else {
        0.0
    };

    DrawdownStatus {
        warning: current_drawdown > max_drawdown * 0.8,
        critical: current_drawdown > max_drawdown,
        current_drawdown,
        max_drawdown,
        peak_value,
        current_value,
    }
}

/// 리스크 요약 기반 권고 문구.
pub fn generate_risk_recommendations(risk: &PortfolioRisk) -> Vec<String> {
    let mut recommendations = Vec::new();

    if risk.overall_risk == RiskLevel::High {
        recommendations.push("Consider reducing position sizes to lower portfolio risk".to_string());
    }
    if risk.high_risk_positions > 0 {
        recommendations.push(format!(
            "Review {} high-risk positions for potential reduction",
            risk.high_risk_positions
        ));
    }
    if risk.max_position_risk > 30.0 {
        recommendations
            .push("Largest position exceeds 30% of portfolio - consider diversifying".to_string());
    }
    if risk.total_exposure > 80.0 {
        recommendations
            .push("Portfolio is highly concentrated - consider adding more positions".to_string());
    }

    recommendations
}

/// 주문 리스크 한도.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size_percentage: f64,
    pub max_order_value: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size_percentage: 25.0,
            max_order_value: f64::INFINITY,
        }
    }
}

/// 주문 승인 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRiskValidation {
    pub approved: bool,
    pub reason: String,
    pub position_size_percentage: f64,
    pub order_value: f64,
}

/// 한도 대비 주문 승인 여부.
pub fn validate_order_risk(
    amount: f64,
    price: f64,
    portfolio_value: f64,
    limits: &RiskLimits,
) -> OrderRiskValidation {
    let order_value = amount * price;
    let position_size_percentage = if portfolio_value > 0.0 {
        order_value / portfolio_value * 100.0
    } else {
        0.0
    };

    let mut reasons = Vec::new();
    if position_size_percentage > limits.max_position_size_percentage {
        reasons.push(format!(
            "High risk: position size {:.1}% exceeds maximum {}%",
            position_size_percentage, limits.max_position_size_percentage
        ));
    }
    if order_value > limits.max_order_value {
        reasons.push(format!(
            "High risk: order value {:.2} exceeds maximum {}",
            order_value, limits.max_order_value
        ));
    }

    OrderRiskValidation {
        approved: reasons.is_empty(),
        reason: if reasons.is_empty() {
            "Order meets risk criteria".to_string()
        } else {
            reasons.join("; ")
        },
        position_size_percentage,
        order_value,
    }
}

/// 변동성이 포함된 보유 자산.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingVolatility {
    pub symbol: String,
    pub market_value: f64,
    /// 0.0 ~ 1.0 스케일 변동성
    pub volatility: f64,
}

/// 종합 리스크 점수 (0 ~ 100).
///
/// 가중 변동성 × 100에 집중도 및 암호화폐 비중 가산점을 더합니다.
pub fn calculate_portfolio_risk_score(holdings: &[HoldingVolatility], total_value: f64) -> f64 {
    if holdings.is_empty() || total_value <= 0.0 {
        return 0.0;
    }

    let mut weighted_volatility = 0.0;
    let mut crypto_allocation = 0.0;
    let mut max_weight: f64 = 0.0;

    for holding in holdings {
        let weight = holding.market_value / total_value;
        max_weight = max_weight.max(weight);
        weighted_volatility += weight * holding.volatility;

        if !FIAT_SYMBOLS.contains(&holding.symbol.to_uppercase().as_str()) {
            crypto_allocation += weight;
        }
    }

    let mut score = (weighted_volatility * 100.0).min(100.0);

    if max_weight > 0.5 {
        score += 20.0;
    } else if max_weight > 0.3 {
        score += 10.0;
    }

    if crypto_allocation > 0.8 {
        score += 15.0;
    } else if crypto_allocation > 0.6 {
        score += 10.0;
    }

    score.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market_position(market: &str, amount: f64, average_price: f64) -> MarketPosition {
        MarketPosition {
            market: market.to_string(),
            amount,
            average_price,
        }
    }

    #[test]
    fn test_position_risk_levels() {
        let big = PositionSnapshot::new("BTC", 1.0, 30000.0, 40000.0);
        let risk = calculate_position_risk(&big, 100000.0);
        assert_eq!(risk.risk_level, RiskLevel::High);
        assert_eq!(risk.position_size_percentage, 40.0);
        assert_eq!(risk.unrealized_pnl, 10000.0);

        let mid = PositionSnapshot::new("ETH", 1.0, 2000.0, 20000.0);
        assert_eq!(calculate_position_risk(&mid, 100000.0).risk_level, RiskLevel::Medium);

        let zero = calculate_position_risk(&mid, 0.0);
        assert_eq!(zero.position_size_percentage, 0.0);
        assert_eq!(zero.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_portfolio_risk_skips_unpriced() {
        let positions = vec![
            market_position("BTC-EUR", 1.0, 40000.0),
            market_position("XRP-EUR", 100.0, 0.5),
        ];
        let prices = HashMap::from([("BTC-EUR".to_string(), 45000.0)]);

        let risk = calculate_portfolio_risk(100000.0, &positions, &prices);
        assert_eq!(risk.position_risks.len(), 1);
        assert_eq!(risk.high_risk_positions, 1);
        assert_eq!(risk.overall_risk, RiskLevel::High);
        assert_eq!(risk.max_position_risk, 45.0);
    }

    #[test]
    fn test_check_order_risk_warnings() {
        let check = check_order_risk("BTC-EUR", 1.0, 30000.0, 100000.0, 10000.0, &[]);
        assert_eq!(check.order_percentage, 30.0);
        assert!(!check.sufficient_balance);
        assert_eq!(check.risk_level, RiskLevel::High);
        assert!(check
            .warnings
            .contains(&"Large order size - over 25% of portfolio".to_string()));

        let positions = vec![market_position("BTC-EUR", 1.0, 20000.0)];
        let concentrated = check_order_risk("BTC-EUR", 0.1, 30000.0, 100000.0, 50000.0, &positions);
        assert_eq!(concentrated.current_exposure, 30.0);
        assert_eq!(concentrated.total_exposure, 33.0);
        assert!(!concentrated
            .warnings
            .iter()
            .any(|w| w.starts_with("High concentration risk")));
    }

    #[test]
    fn test_stop_and_take_profit_prices() {
        assert_eq!(calculate_stop_loss_price(100.0, Side::Buy, DEFAULT_RISK_PERCENTAGE), 95.0);
        assert_eq!(calculate_stop_loss_price(100.0, Side::Sell, DEFAULT_RISK_PERCENTAGE), 105.0);
        let take_profit =
            calculate_take_profit_price(100.0, Side::Buy, DEFAULT_PROFIT_RATIO, DEFAULT_RISK_PERCENTAGE);
        assert!((take_profit - 110.0).abs() < 1e-9);
        assert_eq!(
            calculate_take_profit_price(100.0, Side::Sell, DEFAULT_PROFIT_RATIO, DEFAULT_RISK_PERCENTAGE),
            90.0
        );
    }

    #[test]
    fn test_drawdown() {
        let status = check_drawdown_limits(&[10000.0, 12000.0, 10000.0], DEFAULT_MAX_DRAWDOWN);
        assert_eq!(status.peak_value, 12000.0);
        assert!(status.warning);
        assert!(!status.critical);

        let short = check_drawdown_limits(&[10000.0], DEFAULT_MAX_DRAWDOWN);
        assert!(!short.warning);
        assert_eq!(short.current_drawdown, 0.0);
    }

    #[test]
    fn test_recommendations() {
        let risk = PortfolioRisk {
            overall_risk: RiskLevel::High,
            high_risk_positions: 2,
            medium_risk_positions: 0,
            total_exposure: 90.0,
            max_position_risk: 45.0,
            position_risks: vec![],
        };
        assert_eq!(generate_risk_recommendations(&risk).len(), 4);
    }

    #[test]
    fn test_validate_order_risk() {
        let ok = validate_order_risk(0.1, 40000.0, 100000.0, &RiskLimits::default());
        assert!(ok.approved);
        assert_eq!(ok.reason, "Order meets risk criteria");

        let rejected = validate_order_risk(1.0, 40000.0, 100000.0, &RiskLimits::default());
        assert!(!rejected.approved);
        assert!(rejected.reason.contains("exceeds maximum 25%"));
    }

    #[test]
    fn test_risk_score() {
        let holdings = vec![
            HoldingVolatility {
                symbol: "BTC".into(),
                market_value: 9000.0,
                volatility: 0.5,
            },
            HoldingVolatility {
                symbol: "EUR".into(),
                market_value: 1000.0,
                volatility: 0.0,
            },
        ];
        // 45 + 20 (집중도) + 15 (암호화폐 90%)
        assert_eq!(calculate_portfolio_risk_score(&holdings, 10000.0), 80.0);
        assert_eq!(calculate_portfolio_risk_score(&[], 10000.0), 0.0);
    }
}
