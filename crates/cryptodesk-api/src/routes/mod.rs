//! API 라우트.
//!
//! 모든 REST API 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (트레이딩 모드 포함)
//! - `/api/v1/health` - 동일
//! - `/api/v1/api-keys` - 거래소 API 키 관리
//! - `/api/v1/trading-mode` - dry run / demo / live 전환
//! - `/api/v1/trading` - 잔고, 주문, 내역
//! - `/api/v1/market` - 시장 데이터
//! - `/api/v1/portfolio` - 포트폴리오/포지션/거래 내역

pub mod api_keys;
pub mod health;
pub mod market;
pub mod portfolio;
pub mod trading;
pub mod trading_mode;

pub use api_keys::api_keys_router;
pub use health::{health_router, HealthResponse};
pub use market::market_router;
pub use portfolio::portfolio_router;
pub use trading::trading_router;
pub use trading_mode::trading_mode_router;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // 헬스 체크 엔드포인트
        .nest("/health", health_router())
        // API v1 엔드포인트
        .nest("/api/v1/health", health_router())
        .nest("/api/v1/api-keys", api_keys_router())
        .nest("/api/v1/trading-mode", trading_mode_router())
        .nest("/api/v1/trading", trading_router())
        .nest("/api/v1/market", market_router())
        .nest("/api/v1/portfolio", portfolio_router())
}
