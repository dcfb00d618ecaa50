//! 거래소 게이트웨이.
//!
//! 서명 클라이언트 위에 트레이딩 모드 게이트, rate limiter, 시뮬레이션 엔진을 묶습니다.
//!
//! # 주문 처리 순서
//!
//! 1. 파라미터 검증 (I/O 없음)
//! 2. 자격증명 확인
//! 3. dry-run이면 시뮬레이션 응답 반환 (네트워크 호출 없음)
//! 4. 실거래 모드 확인
//! 5. 실거래 요건 재검증
//! 6. rate limit 확인 (주문 가중치 10)
//! 7. 서명된 HTTP 호출
//!
//! 시장 데이터 조회는 자격증명이나 dry-run과 무관하게 항상 거래소를 호출합니다.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn, Instrument};

use cryptodesk_core::{order_span, validate_market_pair, OrderType, TradingModeGate};

use crate::connector::BitvavoClient;
use crate::error::{classify_error, ExchangeError, ExchangeResult};
use crate::rate_limiter::{RateLimitStatus, RequestWeight, SlidingWindowLimiter};
use crate::simulated::SimulationEngine;
use crate::types::{Balance, BatchOrderResult, ConnectionTest, OrderOutcome, OrderPayload};

/// 배치당 최대 주문 수.
pub const MAX_BATCH_ORDERS: usize = 10;

/// 주문 파라미터 검증.
///
/// 네트워크 호출 전에 실행되며 실패 시 `ExchangeError::InvalidOrder`를 반환합니다.
pub fn validate_order(order: &OrderPayload) -> ExchangeResult<()> {
    if !validate_market_pair(&order.market) {
        return Err(ExchangeError::InvalidOrder(
            "Invalid market format. Expected format: 'BTC-EUR'".to_string(),
        ));
    }

    if !matches!(order.side.as_str(), "buy" | "sell") {
        return Err(ExchangeError::InvalidOrder(
            "Side must be 'buy' or 'sell'".to_string(),
        ));
    }

    let order_type = OrderType::from_str(&order.order_type)
        .map_err(|_| ExchangeError::InvalidOrder(format!("Invalid order type: {}", order.order_type)))?;

    if matches!(order.amount, Some(amount) if amount <= 0.0) {
        return Err(ExchangeError::InvalidOrder("Amount must be positive".to_string()));
    }

    if matches!(order.price, Some(price) if price <= 0.0) {
        return Err(ExchangeError::InvalidOrder("Price must be positive".to_string()));
    }

    if order_type.requires_price() && order.price.is_none() {
        return Err(ExchangeError::InvalidOrder(format!(
            "Price is required for {} orders",
            order_type
        )));
    }

    if order_type == OrderType::Market && order.price.is_some() {
        warn!(market = %order.market, "Price parameter ignored for market orders");
    }

    Ok(())
}

/// 거래소 게이트웨이.
///
/// 요청마다 해당 사용자의 자격증명으로 만든 [`BitvavoClient`]를 받아 생성됩니다.
/// 모드 게이트와 limiter는 프로세스 전체가 공유합니다.
#[derive(Debug)]
pub struct ExchangeGateway {
    client: BitvavoClient,
    mode: Arc<TradingModeGate>,
    limiter: Arc<SlidingWindowLimiter>,
    simulation: Arc<SimulationEngine>,
}

impl ExchangeGateway {
    pub fn new(
        client: BitvavoClient,
        mode: Arc<TradingModeGate>,
        limiter: Arc<SlidingWindowLimiter>,
        simulation: Arc<SimulationEngine>,
    ) -> Self {
        Self {
            client,
            mode,
            limiter,
            simulation,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.client.has_credentials()
    }

    fn require_credentials(&self) -> ExchangeResult<()> {
        if self.client.has_credentials() {
            Ok(())
        } else {
            Err(ExchangeError::CredentialsMissing)
        }
    }

    // ========================================================================
    // 주문
    // ========================================================================

    /// 주문 실행.
    pub async fn place_order(&self, order: &OrderPayload) -> ExchangeResult<OrderOutcome> {
        let span = order_span!("place_order", order.market, order.side);
        self.place_order_inner(order).instrument(span).await
    }

    async fn place_order_inner(&self, order: &OrderPayload) -> ExchangeResult<OrderOutcome> {
        validate_order(order)?;
        self.require_credentials()?;

        if self.mode.is_dry_run_enabled() {
            warn!("{}", self.mode.mode_warning());
            info!(order_type = %order.order_type, amount = ?order.amount, price = ?order.price, "[DRY RUN] Would place order");
            let simulated = self
                .simulation
                .simulate_order_response(order, self.mode.current_mode());
            return Ok(OrderOutcome::Simulated(simulated));
        }

        if !self.mode.is_live_trading() {
            return Err(ExchangeError::LiveTradingDisabled);
        }

        let check = self
            .mode
            .validate_live_trading_requirements(self.client.has_credentials());
        if !check.can_trade_live {
            return Err(ExchangeError::LiveTradingRequirements(check.reason));
        }

        self.limiter.try_acquire(RequestWeight::Order)?;

        warn!("🔴 LIVE TRADING: Placing real order!");
        let response = self.client.post("/order", &order.to_api_body()).await?;
        Ok(OrderOutcome::Live(response))
    }

    /// 배치 주문 (최대 10건).
    ///
    /// 각 주문은 독립적으로 검증/실행되며 하나의 실패가 나머지에 영향을 주지 않습니다.
    pub async fn place_batch_orders(&self, orders: &[OrderPayload]) -> ExchangeResult<Vec<BatchOrderResult>> {
        if orders.len() > MAX_BATCH_ORDERS {
            return Err(ExchangeError::InvalidOrder(format!(
                "Maximum {} orders per batch",
                MAX_BATCH_ORDERS
            )));
        }

        let mut results = Vec::with_capacity(orders.len());
        for order in orders {
            match self.place_order(order).await {
                Ok(outcome) => results.push(BatchOrderResult::Success { order: outcome }),
                Err(e) => {
                    warn!(market = %order.market, error = %e, "Failed to place batch order");
                    results.push(BatchOrderResult::Error {
                        error: e.to_string(),
                        order: order.clone(),
                    });
                }
            }
        }
        Ok(results)
    }

    /// 주문 취소.
    pub async fn cancel_order(&self, order_id: &str, market: Option<&str>) -> ExchangeResult<Value> {
        self.require_credentials()?;

        if self.mode.is_dry_run_enabled() {
            info!(order_id, "[DRY RUN] Would cancel order");
            return Ok(self.simulation.simulate_cancel_response(order_id));
        }

        self.limiter.try_acquire(RequestWeight::Cancel)?;

        let mut query = vec![("orderId", order_id.to_string())];
        if let Some(market) = market {
            query.push(("market", market.to_string()));
        }
        self.client.delete("/order", &query).await
    }

    /// 미체결 주문 목록.
    pub async fn get_orders(&self, market: Option<&str>) -> ExchangeResult<Value> {
        self.require_credentials()?;
        self.limiter.try_acquire(RequestWeight::Balance)?;

        let query: Vec<(&str, String)> = market.map(|m| ("market", m.to_string())).into_iter().collect();
        self.client.get("/ordersOpen", &query).await
    }

    /// 체결 내역.
    pub async fn get_trades(&self, market: Option<&str>, limit: u32) -> ExchangeResult<Value> {
        self.require_credentials()?;
        self.limiter.try_acquire(RequestWeight::Balance)?;

        let mut query = vec![("limit", limit.to_string())];
        if let Some(market) = market {
            query.push(("market", market.to_string()));
        }
        self.client.get("/trades", &query).await
    }

    /// 주문 내역 (체결/취소 포함).
    pub async fn get_order_history(&self, market: &str, limit: u32) -> ExchangeResult<Value> {
        self.require_credentials()?;
        self.limiter.try_acquire(RequestWeight::Balance)?;

        let query = vec![("market", market.to_string()), ("limit", limit.to_string())];
        self.client.get("/orders", &query).await
    }

    // ========================================================================
    // 잔고
    // ========================================================================

    /// 잔고 조회.
    pub async fn get_balance(&self) -> ExchangeResult<Vec<Balance>> {
        if self.mode.is_dry_run_enabled() {
            info!("{}", self.mode.mode_warning());
            info!("[DRY RUN] Returning simulated balance");
            let simulated = serde_json::to_value(self.simulation.simulate_balance_response())?;
            return Balance::parse_list(&simulated);
        }

        self.require_credentials()?;
        self.limiter.try_acquire(RequestWeight::Balance)?;

        info!("🔴 LIVE TRADING: Getting real account balance");
        let response = self.client.get("/balance", &[]).await?;
        Balance::parse_list(&response)
    }

    // ========================================================================
    // 시장 데이터
    // ========================================================================

    async fn market_data(&self, endpoint: &str, query: &[(&str, String)]) -> ExchangeResult<Value> {
        self.limiter.try_acquire(RequestWeight::MarketData)?;
        self.client.get(endpoint, query).await
    }

    /// 서버 시간.
    pub async fn get_time(&self) -> ExchangeResult<Value> {
        self.market_data("/time", &[]).await
    }

    /// 마켓 목록.
    pub async fn get_markets(&self) -> ExchangeResult<Value> {
        self.market_data("/markets", &[]).await
    }

    /// 24시간 ticker. 마켓 미지정 시 전체.
    pub async fn get_ticker(&self, market: Option<&str>) -> ExchangeResult<Value> {
        let query: Vec<(&str, String)> = market.map(|m| ("market", m.to_string())).into_iter().collect();
        self.market_data("/ticker/24h", &query).await
    }

    /// 전체 마켓 24시간 ticker.
    pub async fn get_tickers(&self) -> ExchangeResult<Value> {
        self.get_ticker(None).await
    }

    /// 캔들.
    pub async fn get_candles(&self, market: &str, interval: &str, limit: u32) -> ExchangeResult<Value> {
        let query = vec![("interval", interval.to_string()), ("limit", limit.to_string())];
        self.market_data(&format!("/{}/candles", market), &query).await
    }

    /// 호가창.
    pub async fn get_orderbook(&self, market: &str, depth: u32) -> ExchangeResult<Value> {
        let query = vec![("depth", depth.to_string())];
        self.market_data(&format!("/{}/book", market), &query).await
    }

    /// 시장 체결 내역.
    pub async fn get_market_trades(&self, market: &str, limit: u32) -> ExchangeResult<Value> {
        let query = vec![("limit", limit.to_string())];
        self.market_data(&format!("/{}/trades", market), &query).await
    }

    // ========================================================================
    // 상태
    // ========================================================================

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status()
    }

    /// 연결 및 인증 테스트.
    ///
    /// `/time`으로 연결을, `/balance`로 인증을 확인합니다. 에러는 분류된 결과로 반환합니다.
    pub async fn test_connection(&self) -> ConnectionTest {
        if !self.client.has_credentials() {
            return ConnectionTest::failure(
                ExchangeError::CredentialsMissing.to_string(),
                ExchangeError::CredentialsMissing.kind(),
            );
        }

        let time = match self.get_time().await {
            Ok(time) => time,
            Err(e) => {
                let classified = classify_error(&e);
                return ConnectionTest::failure(
                    format!("API connection failed: {}", classified.message),
                    classified.kind,
                );
            }
        };

        let auth = match self.limiter.try_acquire(RequestWeight::Balance) {
            Ok(()) => self.client.get("/balance", &[]).await,
            Err(e) => Err(e),
        };
        if let Err(e) = auth {
            let classified = classify_error(&e);
            return ConnectionTest::failure(
                format!("Authentication failed: {}", classified.message),
                classified.kind,
            );
        }

        ConnectionTest::success(time.get("time").and_then(Value::as_i64))
    }
}
