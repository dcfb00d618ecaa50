//! 포트폴리오 endpoint.
//!
//! 포트폴리오 생성/조회, 포지션과 거래 내역 조회, 현재가 기반 포지션 갱신을 제공합니다.
//! 데이터베이스가 설정되지 않으면 모든 요청에 503을 반환합니다.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use cryptodesk_core::services::market::value_as_f64;
use cryptodesk_core::{calculate_portfolio_value, PositionSnapshot};

use crate::error::{database_unavailable, from_db, from_validation, not_found, ApiResult};
use crate::repository::{PortfolioRecord, PortfolioRepository, PositionRecord, TradeRow, CURRENT_USER_ID};
use crate::state::AppState;

/// 거래 내역 조회 최대 건수.
const TRADE_HISTORY_LIMIT: i64 = 500;

/// 포지션 평가에 사용하는 quote 통화.
const QUOTE_CURRENCY: &str = "EUR";

/// 포트폴리오 생성 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct PortfolioCreate {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub total_value: f64,
    pub is_active: bool,
}

impl From<PortfolioRecord> for PortfolioResponse {
    fn from(record: PortfolioRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            total_value: record.total_value,
            is_active: record.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub id: i64,
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
}

impl From<PositionRecord> for PositionResponse {
    fn from(record: PositionRecord) -> Self {
        Self {
            id: record.id,
            symbol: record.symbol,
            quantity: record.quantity,
            average_price: record.average_price,
            current_price: record.current_price.unwrap_or(0.0),
            unrealized_pnl: record.unrealized_pnl,
        }
    }
}

/// 거래 내역 응답. `quantity`는 주문 수량(`amount`)입니다.
#[derive(Debug, Serialize, Deserialize)]
pub struct TradeResponse {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub quantity: f64,
    pub price: f64,
    pub filled_quantity: f64,
    pub filled_price: f64,
    pub status: String,
    pub simulated: bool,
    pub created_at: String,
}

impl From<TradeRow> for TradeResponse {
    fn from(row: TradeRow) -> Self {
        Self {
            id: row.id,
            symbol: row.symbol().to_string(),
            side: row.side,
            order_type: row.order_type,
            quantity: row.amount,
            price: row.price.unwrap_or(0.0),
            filled_quantity: row.filled_amount,
            filled_price: row.filled_price.unwrap_or(0.0),
            status: row.status,
            simulated: row.simulated,
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

/// 포지션 갱신 결과.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePositionsResponse {
    pub message: String,
    pub updated_positions: usize,
    pub total_value: f64,
}

fn pool(state: &AppState) -> ApiResult<&PgPool> {
    state.db_pool.as_ref().ok_or_else(database_unavailable)
}

async fn find_portfolio(pool: &PgPool, portfolio_id: i64) -> ApiResult<PortfolioRecord> {
    PortfolioRepository::find_by_id(pool, CURRENT_USER_ID, portfolio_id)
        .await
        .map_err(from_db)?
        .ok_or_else(|| not_found("Portfolio not found"))
}

/// 포트폴리오 생성.
///
/// POST /api/v1/portfolio
pub async fn create_portfolio(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PortfolioCreate>,
) -> ApiResult<Json<PortfolioResponse>> {
    request.validate().map_err(from_validation)?;
    let pool = pool(&state)?;

    let record = PortfolioRepository::create(pool, CURRENT_USER_ID, &request.name, &request.description)
        .await
        .map_err(from_db)?;
    info!(portfolio_id = record.id, name = %record.name, "Portfolio created");
    Ok(Json(record.into()))
}

/// 포트폴리오 목록.
///
/// GET /api/v1/portfolio
pub async fn list_portfolios(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<PortfolioResponse>>> {
    let pool = pool(&state)?;
    let records = PortfolioRepository::list_by_user(pool, CURRENT_USER_ID)
        .await
        .map_err(from_db)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// 포트폴리오 조회.
///
/// GET /api/v1/portfolio/{id}
pub async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> ApiResult<Json<PortfolioResponse>> {
    let pool = pool(&state)?;
    Ok(Json(find_portfolio(pool, portfolio_id).await?.into()))
}

/// 포지션 목록.
///
/// GET /api/v1/portfolio/{id}/positions
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> ApiResult<Json<Vec<PositionResponse>>> {
    let pool = pool(&state)?;
    find_portfolio(pool, portfolio_id).await?;
    let positions = PortfolioRepository::positions(pool, portfolio_id)
        .await
        .map_err(from_db)?;
    Ok(Json(positions.into_iter().map(Into::into).collect()))
}

/// 거래 내역.
///
/// GET /api/v1/portfolio/{id}/trades
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> ApiResult<Json<Vec<TradeResponse>>> {
    let pool = pool(&state)?;
    find_portfolio(pool, portfolio_id).await?;
    let trades = PortfolioRepository::trades(pool, CURRENT_USER_ID, portfolio_id, TRADE_HISTORY_LIMIT)
        .await
        .map_err(from_db)?;
    Ok(Json(trades.into_iter().map(Into::into).collect()))
}

/// 현재가로 포지션 갱신 후 총 평가액 재계산.
///
/// 시세를 가져오지 못한 포지션은 기존 현재가를 유지합니다.
///
/// PUT /api/v1/portfolio/{id}/update-positions
pub async fn update_positions(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> ApiResult<Json<UpdatePositionsResponse>> {
    let pool = pool(&state)?;
    find_portfolio(pool, portfolio_id).await?;
    let positions = PortfolioRepository::positions(pool, portfolio_id)
        .await
        .map_err(from_db)?;

    let gateway = state.public_gateway();
    let mut snapshots = Vec::with_capacity(positions.len());
    let mut updated = 0;

    for position in positions {
        let market = format!("{}-{}", position.symbol, QUOTE_CURRENCY);
        let price = match gateway.get_ticker(Some(&market)).await {
            Ok(ticker) => ticker.get("last").and_then(value_as_f64),
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Failed to fetch price");
                None
            }
        };

        let position = match price {
            Some(price) => {
                updated += 1;
                PortfolioRepository::update_position_price(pool, position.id, price)
                    .await
                    .map_err(from_db)?
            }
            None => position,
        };

        snapshots.push(PositionSnapshot::new(
            position.symbol,
            position.quantity,
            position.average_price,
            position.current_price.unwrap_or(0.0),
        ));
    }

    let total_value = calculate_portfolio_value(&snapshots);
    PortfolioRepository::set_total_value(pool, portfolio_id, total_value)
        .await
        .map_err(from_db)?;

    info!(portfolio_id, updated, total_value, "Portfolio positions updated");
    Ok(Json(UpdatePositionsResponse {
        message: "Portfolio positions updated successfully".to_string(),
        updated_positions: updated,
        total_value,
    }))
}

/// 포트폴리오 라우터 생성.
pub fn portfolio_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_portfolios).post(create_portfolio))
        .route("/{portfolio_id}", get(get_portfolio))
        .route("/{portfolio_id}/positions", get(get_positions))
        .route("/{portfolio_id}/trades", get(get_trades))
        .route("/{portfolio_id}/update-positions", put(update_positions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::create_test_state;

    fn app() -> Router {
        Router::new()
            .nest("/portfolio", portfolio_router())
            .with_state(Arc::new(create_test_state()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_requires_database() {
        for (method, uri) in [
            ("GET", "/portfolio"),
            ("GET", "/portfolio/1"),
            ("GET", "/portfolio/1/positions"),
            ("PUT", "/portfolio/1/update-positions"),
        ] {
            let response = app()
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{method} {uri}");
            assert_eq!(body_json(response).await["detail"], "Database not configured");
        }
    }

    #[tokio::test]
    async fn test_create_validates_before_database() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/portfolio")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"name": ""}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "name must be 1-100 characters");
    }

    #[test]
    fn test_trade_response_uses_quantity_names() {
        let row = TradeRow {
            id: 7,
            user_id: 1,
            portfolio_id: Some(1),
            exchange: "bitvavo".into(),
            market: "BTC-EUR".into(),
            side: "buy".into(),
            order_type: "limit".into(),
            amount: 0.5,
            price: Some(40000.0),
            filled_amount: 0.25,
            filled_price: None,
            status: "open".into(),
            exchange_order_id: Some("abc".into()),
            fee: 0.0,
            simulated: true,
            created_at: Utc::now(),
        };

        let response = TradeResponse::from(row);
        assert_eq!(response.symbol, "BTC");
        assert_eq!(response.quantity, 0.5);
        assert_eq!(response.filled_quantity, 0.25);
        assert_eq!(response.filled_price, 0.0);
        assert!(response.simulated);
    }
}
