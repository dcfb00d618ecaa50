//! 트레이딩 모드 endpoint.
//!
//! dry run / demo / live 전환과 실거래 요건 검사를 제공합니다.
//! live 전환은 두 단계입니다: 모드를 live로 설정하고 override가 꺼져 있어야 합니다.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use cryptodesk_core::TradingMode;

use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

/// 모드 상태 응답.
#[derive(Debug, Serialize)]
pub struct TradingModeResponse {
    pub current_mode: TradingMode,
    pub dry_run_enabled: bool,
    pub is_live_trading: bool,
    pub warning_message: &'static str,
    pub can_trade_live: bool,
    pub validation_message: String,
    pub message: String,
}

/// 모드 전환 요청.
#[derive(Debug, Deserialize)]
pub struct SetTradingModeRequest {
    pub mode: String,
    #[serde(default)]
    pub force_dry_run: bool,
}

/// 비상 dry-run 응답.
#[derive(Debug, Serialize)]
pub struct EmergencyDryRunResponse {
    pub dry_run_enabled: bool,
    pub message: &'static str,
    pub current_mode: TradingMode,
}

/// 실거래 요건별 충족 여부.
#[derive(Debug, Serialize)]
pub struct LiveRequirementDetails {
    pub api_key_configured: bool,
    pub mode_is_live: bool,
    pub dry_run_disabled: bool,
}

/// 실거래 요건 검사 응답.
#[derive(Debug, Serialize)]
pub struct ValidateLiveResponse {
    pub can_trade_live: bool,
    pub requirements: String,
    pub current_mode: TradingMode,
    pub details: LiveRequirementDetails,
}

async fn mode_response(state: &AppState, message: String) -> TradingModeResponse {
    let credentials = state.credentials_configured().await;
    let snapshot = state.mode_gate.snapshot();
    let check = state.mode_gate.validate_live_trading_requirements(credentials);

    TradingModeResponse {
        current_mode: snapshot.current_mode,
        dry_run_enabled: snapshot.dry_run_enabled,
        is_live_trading: snapshot.is_live_trading,
        warning_message: snapshot.warning_message,
        can_trade_live: check.can_trade_live,
        validation_message: check.reason,
        message,
    }
}

/// 현재 모드 조회.
///
/// GET /api/v1/trading-mode/status
pub async fn get_trading_mode(State(state): State<Arc<AppState>>) -> Json<TradingModeResponse> {
    Json(mode_response(&state, "Trading mode status retrieved".to_string()).await)
}

/// 모드 전환.
///
/// `force_dry_run` 없이 live로 전환하려면 자격증명이 있고 override가 꺼져 있어야 합니다.
///
/// POST /api/v1/trading-mode/set
pub async fn set_trading_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetTradingModeRequest>,
) -> ApiResult<Json<TradingModeResponse>> {
    let mode: TradingMode = request.mode.parse().map_err(bad_request)?;

    if mode == TradingMode::Live && !request.force_dry_run {
        let credentials = state.credentials_configured().await;
        let check = state.mode_gate.validate_live_transition(credentials);
        if !check.can_trade_live {
            return Err(bad_request(format!("Cannot enable live trading: {}", check.reason)));
        }
        warn!("🔴 Switching to LIVE trading mode");
    }

    state.mode_gate.set_mode(mode, request.force_dry_run);

    let message = format!("Trading mode switched to {}", mode.as_str().to_uppercase());
    Ok(Json(mode_response(&state, message).await))
}

/// 비상 dry-run 활성화. 현재 모드는 유지됩니다.
///
/// POST /api/v1/trading-mode/enable-dry-run
pub async fn enable_dry_run(State(state): State<Arc<AppState>>) -> Json<EmergencyDryRunResponse> {
    let current_mode = state.mode_gate.enable_emergency_dry_run();
    Json(EmergencyDryRunResponse {
        dry_run_enabled: true,
        message: "Emergency dry-run mode enabled for safety",
        current_mode,
    })
}

/// 실거래 요건 검사.
///
/// GET /api/v1/trading-mode/validate-live
pub async fn validate_live_trading(State(state): State<Arc<AppState>>) -> Json<ValidateLiveResponse> {
    let credentials = state.credentials_configured().await;
    let check = state.mode_gate.validate_live_trading_requirements(credentials);
    let current_mode = state.mode_gate.current_mode();

    Json(ValidateLiveResponse {
        can_trade_live: check.can_trade_live,
        requirements: check.reason,
        current_mode,
        details: LiveRequirementDetails {
            api_key_configured: credentials,
            mode_is_live: current_mode == TradingMode::Live,
            dry_run_disabled: !state.mode_gate.dry_run_override(),
        },
    })
}

/// 트레이딩 모드 라우터 생성.
pub fn trading_mode_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_trading_mode))
        .route("/set", post(set_trading_mode))
        .route("/enable-dry-run", post(enable_dry_run))
        .route("/validate-live", get(validate_live_trading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use cryptodesk_core::AppConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::state::{create_test_state, create_test_state_with, test_credential_store};

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .nest("/trading-mode", trading_mode_router())
            .with_state(state)
    }

    fn set_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/trading-mode/set")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// live 전환이 가능한 설정 (자격증명 있음, override 꺼짐).
    fn live_ready_state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.exchange.api_key = Some("config-key-0123456789".into());
        config.exchange.api_secret = Some("config-secret-0123456789".into());
        config.trading.dry_run_enabled = false;
        Arc::new(create_test_state_with(config, test_credential_store()))
    }

    #[tokio::test]
    async fn test_default_status_is_dry_run() {
        let app = app(Arc::new(create_test_state()));
        let response = app
            .oneshot(Request::builder().uri("/trading-mode/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["current_mode"], "dry_run");
        assert_eq!(body["dry_run_enabled"], true);
        assert_eq!(body["is_live_trading"], false);
        assert_eq!(body["can_trade_live"], false);
        assert_eq!(body["validation_message"], "API credentials not configured");
    }

    #[tokio::test]
    async fn test_invalid_mode_rejected() {
        let app = app(Arc::new(create_test_state()));
        let response = app.oneshot(set_request(json!({"mode": "turbo"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Invalid trading mode: turbo. Options: dry_run, demo, live"
        );
    }

    #[tokio::test]
    async fn test_live_without_credentials_rejected() {
        let state = Arc::new(create_test_state());
        let app = app(Arc::clone(&state));
        let response = app.oneshot(set_request(json!({"mode": "live"}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Cannot enable live trading: API credentials not configured"
        );
        assert_eq!(state.mode_gate.current_mode(), TradingMode::DryRun);
    }

    #[tokio::test]
    async fn test_live_with_force_keeps_dry_run() {
        let state = Arc::new(create_test_state());
        let app = app(Arc::clone(&state));
        let response = app
            .oneshot(set_request(json!({"mode": "live", "force_dry_run": true})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["current_mode"], "live");
        assert_eq!(body["is_live_trading"], false);
        assert_eq!(body["message"], "Trading mode switched to LIVE");
        assert!(state.mode_gate.is_dry_run_enabled());
    }

    #[tokio::test]
    async fn test_switch_to_live_then_emergency_dry_run() {
        let state = live_ready_state();
        let app = app(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(set_request(json!({"mode": "live"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["is_live_trading"], true);
        assert_eq!(body["can_trade_live"], true);
        assert_eq!(body["validation_message"], "Live trading requirements met");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/trading-mode/enable-dry-run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["dry_run_enabled"], true);
        assert_eq!(body["current_mode"], "live");
        assert!(!state.mode_gate.is_live_trading());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/trading-mode/validate-live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["can_trade_live"], false);
        assert_eq!(body["requirements"], "Dry run mode is still active");
        assert_eq!(
            body["details"],
            json!({"api_key_configured": true, "mode_is_live": true, "dry_run_disabled": false})
        );
    }
}
