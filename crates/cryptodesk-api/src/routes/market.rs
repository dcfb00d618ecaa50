//! 시장 데이터 endpoint.
//!
//! 공개 엔드포인트만 사용하므로 자격증명 없이 동작하며 dry run의 영향을 받지 않습니다.
//! 숫자 문자열은 f64로 변환되어 반환됩니다.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use validator::Validate;

use cryptodesk_core::services::market::{process_candle_data, process_ticker_data, value_as_f64};
use cryptodesk_core::validate_market_pair;

use crate::error::{bad_request, from_exchange, from_validation, ApiResult};
use crate::state::AppState;

/// Bitvavo 캔들 간격.
const CANDLE_INTERVALS: [&str; 11] = [
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d",
];

/// 호가창 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct DepthQuery {
    #[serde(default = "default_depth")]
    #[validate(range(min = 1, max = 1000, message = "depth must be between 1 and 1000"))]
    pub depth: u32,
}

fn default_depth() -> u32 {
    50
}

/// 시장 체결 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct TradesQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: u32,
}

/// 캔들 쿼리.
#[derive(Debug, Deserialize, Validate)]
pub struct CandleQuery {
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1440, message = "limit must be between 1 and 1440"))]
    pub limit: u32,
}

fn default_interval() -> String {
    "1h".to_string()
}

fn default_limit() -> u32 {
    100
}

/// 캔들 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct CandleResponse {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 현재가 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    pub market: String,
    pub price: f64,
    pub timestamp: String,
}

/// `BASE-QUOTE` 형식 검사.
pub(crate) fn check_market(market: &str) -> ApiResult<()> {
    if validate_market_pair(market) {
        Ok(())
    } else {
        Err(bad_request(format!(
            "Invalid market format: {}. Expected BASE-QUOTE (e.g. BTC-EUR)",
            market
        )))
    }
}

/// ticker 객체 또는 배열의 숫자 필드 변환.
fn normalize_ticker(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(process_ticker_data(&map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_ticker).collect()),
        other => other,
    }
}

/// 마켓 목록.
///
/// GET /api/v1/market/markets
pub async fn get_markets(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let markets = state
        .public_gateway()
        .get_markets()
        .await
        .map_err(from_exchange)?;
    Ok(Json(markets))
}

/// 전체 ticker.
///
/// GET /api/v1/market/ticker
pub async fn get_all_tickers(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let tickers = state
        .public_gateway()
        .get_tickers()
        .await
        .map_err(from_exchange)?;
    Ok(Json(normalize_ticker(tickers)))
}

/// 마켓 ticker.
///
/// GET /api/v1/market/ticker/{market}
pub async fn get_ticker(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
) -> ApiResult<Json<Value>> {
    check_market(&market)?;
    let ticker = state
        .public_gateway()
        .get_ticker(Some(&market))
        .await
        .map_err(from_exchange)?;
    Ok(Json(normalize_ticker(ticker)))
}

/// 호가창.
///
/// GET /api/v1/market/orderbook/{market}
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
    Query(query): Query<DepthQuery>,
) -> ApiResult<Json<Value>> {
    check_market(&market)?;
    query.validate().map_err(from_validation)?;
    let book = state
        .public_gateway()
        .get_orderbook(&market, query.depth)
        .await
        .map_err(from_exchange)?;
    Ok(Json(book))
}

/// 시장 체결 내역.
///
/// GET /api/v1/market/trades/{market}
pub async fn get_market_trades(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
    Query(query): Query<TradesQuery>,
) -> ApiResult<Json<Value>> {
    check_market(&market)?;
    query.validate().map_err(from_validation)?;
    let trades = state
        .public_gateway()
        .get_market_trades(&market, query.limit)
        .await
        .map_err(from_exchange)?;
    Ok(Json(trades))
}

/// 캔들.
///
/// GET /api/v1/market/candles/{market}
pub async fn get_candles(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
    Query(query): Query<CandleQuery>,
) -> ApiResult<Json<Vec<CandleResponse>>> {
    check_market(&market)?;
    query.validate().map_err(from_validation)?;
    if !CANDLE_INTERVALS.contains(&query.interval.as_str()) {
        return Err(bad_request(format!(
            "Invalid interval: {}. Options: {}",
            query.interval,
            CANDLE_INTERVALS.join(", ")
        )));
    }

    let raw = state
        .public_gateway()
        .get_candles(&market, &query.interval, query.limit)
        .await
        .map_err(from_exchange)?;

    let candles = raw
        .as_array()
        .map(|items| process_candle_data(items))
        .unwrap_or_default()
        .into_iter()
        .map(|c| CandleResponse {
            timestamp: c.timestamp as i64,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        })
        .collect();
    Ok(Json(candles))
}

/// 현재가 (ticker의 `last`).
///
/// GET /api/v1/market/price/{market}
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(market): Path<String>,
) -> ApiResult<Json<PriceResponse>> {
    check_market(&market)?;
    let ticker = state
        .public_gateway()
        .get_ticker(Some(&market))
        .await
        .map_err(from_exchange)?;

    let price = ticker
        .get("last")
        .and_then(value_as_f64)
        .ok_or_else(|| bad_request(format!("No price available for {}", market)))?;

    Ok(Json(PriceResponse {
        market,
        price,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// 시장 데이터 라우터 생성.
pub fn market_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/markets", get(get_markets))
        .route("/ticker", get(get_all_tickers))
        .route("/ticker/{market}", get(get_ticker))
        .route("/orderbook/{market}", get(get_orderbook))
        .route("/trades/{market}", get(get_market_trades))
        .route("/candles/{market}", get(get_candles))
        .route("/price/{market}", get(get_price))
}
