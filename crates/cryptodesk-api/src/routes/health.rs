//! 헬스 체크 endpoint.
//!
//! 서버 상태와 현재 트레이딩 모드를 보고합니다.
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use cryptodesk_core::TradingMode;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    pub trading_mode: TradingMode,

    /// 모드 경고 문구
    pub mode_warning: String,

    /// 데이터베이스 상태 ("up" | "down" | "not_configured")
    pub database: String,
}

/// 헬스 체크.
///
/// DB가 설정되어 있으나 응답하지 않으면 503과 "degraded"를 반환합니다.
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (database, status, status_code) = if state.db_pool.is_some() {
        if state.is_db_healthy().await {
            ("up", "healthy", StatusCode::OK)
        } else {
            ("down", "degraded", StatusCode::SERVICE_UNAVAILABLE)
        }
    } else {
        ("not_configured", "healthy", StatusCode::OK)
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        trading_mode: state.mode_gate.current_mode(),
        mode_warning: state.mode_gate.mode_warning().to_string(),
        database: database.to_string(),
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use crate::state::create_test_state;

    #[tokio::test]
    async fn test_health_reports_trading_mode() {
        let state = Arc::new(create_test_state());
        let app = Router::new()
            .route("/health", get(health_check))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.trading_mode, TradingMode::DryRun);
        assert!(health.mode_warning.contains("DRY RUN"));
        assert_eq!(health.database, "not_configured");
        assert!(!health.version.is_empty());
    }
}
