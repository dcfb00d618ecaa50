//! 트레이딩 endpoint.
//!
//! 잔고 조회, 주문 실행/취소, 주문·체결 내역을 제공합니다.
//! dry run 여부는 게이트웨이가 결정하며, 시뮬레이션 결과는 `simulated: true`로 표시됩니다.
//!
//! `portfolio_id`와 함께 주문하고 DB가 설정되어 있으면 결과가 거래 내역으로 기록됩니다.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use cryptodesk_core::services::market::value_as_f64;
use cryptodesk_core::{OrderStatus, TradeRecord};
use cryptodesk_exchange::{
    Balance, BatchOrderResult, ExchangeGateway, OrderOutcome, OrderPayload, RateLimitStatus,
};

use crate::error::{from_exchange, from_store, from_validation, ApiResult};
use crate::repository::{PortfolioRepository, CURRENT_USER_ID};
use crate::routes::market::check_market;
use crate::state::{AppState, TRADING_EXCHANGE};

/// 주문 요청.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub market: String,
    /// `/buy`, `/sell`에서는 무시됩니다
    #[serde(default)]
    pub side: String,
    pub order_type: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub trigger_amount: Option<f64>,
    #[serde(default)]
    pub stop_loss_price: Option<f64>,
    #[serde(default)]
    pub take_profit_price: Option<f64>,
    /// 거래 내역을 기록할 포트폴리오
    #[serde(default)]
    pub portfolio_id: Option<i64>,
}

impl OrderRequest {
    /// 거래소 주문 형식으로 변환. 손절/익절 가격은 추가 필드로 전달됩니다.
    pub fn to_payload(&self, side: &str) -> OrderPayload {
        let mut payload = OrderPayload::new(&self.market, side, &self.order_type)
            .with_extra("triggerAmount", self.trigger_amount)
            .with_extra("stopLossPrice", self.stop_loss_price)
            .with_extra("takeProfitPrice", self.take_profit_price);
        payload.amount = self.amount;
        payload.price = self.price;
        payload
    }
}

/// 주문 결과.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: String,
    pub message: String,
    pub simulated: bool,
}

/// 내역 조회 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    pub market: Option<String>,
    #[serde(default = "default_history_limit")]
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    100
}

/// 마켓 필터 쿼리.
#[derive(Debug, Deserialize)]
pub struct MarketFilter {
    pub market: Option<String>,
}

/// 선택적 마켓 필터 검사. 지정된 경우에만 형식을 확인합니다.
fn check_market_filter(market: Option<&str>) -> ApiResult<()> {
    market.map_or(Ok(()), check_market)
}

async fn gateway(state: &AppState) -> ApiResult<ExchangeGateway> {
    state.trading_gateway().await.map_err(from_store)
}

/// 주문 결과를 거래 기록으로 변환.
///
/// 방향이나 주문 유형을 해석할 수 없으면 `None`.
pub fn to_trade_record(order: &OrderPayload, outcome: &OrderOutcome) -> Option<TradeRecord> {
    let side = order.side.parse().ok()?;
    let order_type = order.order_type.parse().ok()?;
    let status = OrderStatus::from_exchange(&outcome.status());
    let number = |value: &Value, key: &str| value.get(key).and_then(value_as_f64);

    let (filled_amount, filled_price, fee) = match outcome {
        OrderOutcome::Simulated(sim) => {
            let filled_amount: f64 = sim.filled_amount.parse().unwrap_or(0.0);
            let filled_price: Option<f64> = sim.filled_price.as_deref().and_then(|p| p.parse().ok());
            // 시뮬레이션의 fee는 수수료율
            let fee_rate: f64 = sim.fee.parse().unwrap_or(0.0);
            let fee = filled_amount * filled_price.unwrap_or(0.0) * fee_rate;
            (filled_amount, filled_price, fee)
        }
        OrderOutcome::Live(value) => {
            let filled_amount = number(value, "filledAmount").unwrap_or(0.0);
            let filled_quote = number(value, "filledAmountQuote");
            let filled_price = match filled_quote {
                Some(quote) if filled_amount > 0.0 => Some(quote / filled_amount),
                _ => None,
            };
            (filled_amount, filled_price, number(value, "feePaid").unwrap_or(0.0))
        }
    };

    Some(TradeRecord {
        exchange_order_id: outcome.order_id().unwrap_or_default(),
        market: order.market.clone(),
        side,
        order_type,
        amount: order.amount.unwrap_or(0.0),
        price: order.price,
        filled_amount,
        filled_price,
        status,
        fee,
        simulated: outcome.is_simulated(),
        created_at: Utc::now(),
    })
}

/// 포트폴리오가 지정되었고 DB가 있으면 거래 내역 기록.
///
/// 주문은 이미 실행되었으므로 기록 실패는 로그만 남깁니다.
async fn record_outcome(state: &AppState, portfolio_id: Option<i64>, order: &OrderPayload, outcome: &OrderOutcome) {
    let (Some(portfolio_id), Some(pool)) = (portfolio_id, state.db_pool.as_ref()) else {
        return;
    };
    let Some(trade) = to_trade_record(order, outcome) else {
        return;
    };

    if let Err(e) =
        PortfolioRepository::record_trade(pool, CURRENT_USER_ID, Some(portfolio_id), TRADING_EXCHANGE, &trade).await
    {
        warn!(portfolio_id, error = %e, "Failed to record trade");
    }
}

async fn execute(state: &AppState, request: &OrderRequest, side: &str) -> ApiResult<OrderOutcome> {
    let payload = request.to_payload(side);
    let outcome = gateway(state)
        .await?
        .place_order(&payload)
        .await
        .map_err(from_exchange)?;

    info!(
        market = %payload.market,
        side,
        order_id = ?outcome.order_id(),
        simulated = outcome.is_simulated(),
        "Order placed"
    );
    record_outcome(state, request.portfolio_id, &payload, &outcome).await;
    Ok(outcome)
}

/// 잔고 조회.
///
/// GET /api/v1/trading/balance
pub async fn get_balance(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Balance>>> {
    let balances = gateway(&state)
        .await?
        .get_balance()
        .await
        .map_err(from_exchange)?;
    Ok(Json(balances))
}

/// 주문 실행.
///
/// POST /api/v1/trading/order
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let outcome = execute(&state, &request, &request.side).await?;
    Ok(Json(OrderResponse {
        order_id: outcome.order_id().unwrap_or_default(),
        status: outcome.status(),
        message: "Order placed successfully".to_string(),
        simulated: outcome.is_simulated(),
    }))
}

/// 매수 주문. 거래소 응답을 그대로 반환합니다.
///
/// POST /api/v1/trading/buy
pub async fn buy_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = execute(&state, &request, "buy").await?;
    Ok(Json(outcome.to_value()))
}

/// 매도 주문. 거래소 응답을 그대로 반환합니다.
///
/// POST /api/v1/trading/sell
pub async fn sell_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = execute(&state, &request, "sell").await?;
    Ok(Json(outcome.to_value()))
}

/// 배치 주문 (최대 10건).
///
/// POST /api/v1/trading/batch-orders
pub async fn batch_orders(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<OrderRequest>>,
) -> ApiResult<Json<Vec<BatchOrderResult>>> {
    let payloads: Vec<OrderPayload> = requests.iter().map(|r| r.to_payload(&r.side)).collect();
    let results = gateway(&state)
        .await?
        .place_batch_orders(&payloads)
        .await
        .map_err(from_exchange)?;

    for ((request, payload), result) in requests.iter().zip(&payloads).zip(&results) {
        if let BatchOrderResult::Success { order } = result {
            record_outcome(&state, request.portfolio_id, payload, order).await;
        }
    }
    Ok(Json(results))
}

/// 미체결 주문.
///
/// GET /api/v1/trading/orders
pub async fn get_open_orders(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MarketFilter>,
) -> ApiResult<Json<Value>> {
    check_market_filter(filter.market.as_deref())?;
    let orders = gateway(&state)
        .await?
        .get_orders(filter.market.as_deref())
        .await
        .map_err(from_exchange)?;
    Ok(Json(orders))
}

/// 주문 취소.
///
/// DELETE /api/v1/trading/order/{order_id}
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Query(filter): Query<MarketFilter>,
) -> ApiResult<Json<Value>> {
    check_market_filter(filter.market.as_deref())?;
    let result = gateway(&state)
        .await?
        .cancel_order(&order_id, filter.market.as_deref())
        .await
        .map_err(from_exchange)?;
    Ok(Json(result))
}

/// 주문 내역. 마켓 미지정 시 전체 체결 내역을 반환합니다.
///
/// GET /api/v1/trading/order-history
pub async fn get_order_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    query.validate().map_err(from_validation)?;
    check_market_filter(query.market.as_deref())?;
    let gateway = gateway(&state).await?;

    let history = match query.market.as_deref() {
        Some(market) => gateway.get_order_history(market, query.limit).await,
        None => gateway.get_trades(None, query.limit).await,
    }
    .map_err(from_exchange)?;
    Ok(Json(history))
}

/// 체결 내역.
///
/// GET /api/v1/trading/trade-history
pub async fn get_trade_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    query.validate().map_err(from_validation)?;
    check_market_filter(query.market.as_deref())?;
    let history = gateway(&state)
        .await?
        .get_trades(query.market.as_deref(), query.limit)
        .await
        .map_err(from_exchange)?;
    Ok(Json(history))
}

/// rate limit 현황.
///
/// GET /api/v1/trading/rate-limit
pub async fn rate_limit_status(State(state): State<Arc<AppState>>) -> Json<RateLimitStatus> {
    Json(state.limiter.status())
}

/// 트레이딩 라우터 생성.
pub fn trading_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/order", post(place_order))
        .route("/order/{order_id}", delete(cancel_order))
        .route("/buy", post(buy_order))
        .route("/sell", post(sell_order))
        .route("/batch-orders", post(batch_orders))
        .route("/orders", get(get_open_orders))
        .route("/order-history", get(get_order_history))
        .route("/trade-history", get(get_trade_history))
        .route("/rate-limit", get(rate_limit_status))
}
