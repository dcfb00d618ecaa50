//! API 키 관리 endpoint.
//!
//! 거래소 API key/secret을 암호화하여 저장하고, 상태 조회/삭제/연결 테스트를 제공합니다.
//!
//! # 보안
//! - key/secret은 저장 전에 암호화되며 응답에 포함되지 않음
//! - 삭제는 비활성화로만 처리

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use cryptodesk_exchange::ErrorKind;

use crate::error::{api_error, from_store, not_found, ApiResult};
use crate::repository::{CredentialLookup, CredentialStatus, CURRENT_USER_ID};
use crate::state::{AppState, TRADING_EXCHANGE};

/// API 키 저장 요청.
#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
    pub api_secret: String,
}

/// 저장/삭제 결과.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyActionResponse {
    pub message: String,
    pub exchange: String,
    /// "configured" 또는 "deleted"
    pub status: String,
}

/// 연결 테스트 결과.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyTestResponse {
    pub exchange: String,
    /// "success" | "error" | "not_implemented"
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// API 키 저장 또는 갱신.
///
/// POST /api/v1/api-keys/{exchange}
pub async fn store_api_key(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
    Json(request): Json<ApiKeyRequest>,
) -> ApiResult<Json<ApiKeyActionResponse>> {
    state
        .credentials
        .store(CURRENT_USER_ID, &exchange, &request.api_key, &request.api_secret)
        .await
        .map_err(from_store)?;

    let exchange = exchange.to_lowercase();
    Ok(Json(ApiKeyActionResponse {
        message: format!("API key for {} stored successfully", exchange),
        exchange,
        status: "configured".to_string(),
    }))
}

/// 거래소별 설정 여부.
///
/// GET /api/v1/api-keys/status
pub async fn api_key_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<CredentialStatus>> {
    let status = state
        .credentials
        .status(CURRENT_USER_ID)
        .await
        .map_err(from_store)?;
    Ok(Json(status))
}

/// API 키 삭제 (비활성화).
///
/// DELETE /api/v1/api-keys/{exchange}
pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
) -> ApiResult<Json<ApiKeyActionResponse>> {
    let exchange = exchange.to_lowercase();
    state
        .credentials
        .delete(CURRENT_USER_ID, &exchange)
        .await
        .map_err(from_store)?;

    Ok(Json(ApiKeyActionResponse {
        message: format!("API key for {} deleted successfully", exchange),
        exchange,
        status: "deleted".to_string(),
    }))
}

/// 저장된 API 키로 연결 테스트.
///
/// GET /api/v1/api-keys/{exchange}/test
pub async fn test_api_key(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
) -> ApiResult<Json<ApiKeyTestResponse>> {
    let exchange = exchange.to_lowercase();
    let credentials = match state
        .credentials
        .load(CURRENT_USER_ID, &exchange)
        .await
        .map_err(from_store)?
    {
        CredentialLookup::Found(credentials) => credentials,
        CredentialLookup::NotFound => {
            return Err(not_found(format!("No API key configured for {}", exchange)));
        }
        CredentialLookup::DecryptionFailed(_) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                "CREDENTIAL_UNREADABLE",
                format!("Stored API key for {} could not be decrypted", exchange),
            ));
        }
    };

    if exchange != TRADING_EXCHANGE {
        return Ok(Json(ApiKeyTestResponse {
            message: format!("Testing for {} not yet implemented", exchange),
            exchange,
            status: "not_implemented".to_string(),
            server_time: None,
            kind: None,
        }));
    }

    let result = state
        .gateway_with(Some(credentials.into_bitvavo()))
        .test_connection()
        .await;
    info!(exchange = %exchange, status = result.status, "API key test finished");

    Ok(Json(ApiKeyTestResponse {
        exchange,
        status: result.status.to_string(),
        message: result.message,
        server_time: result.server_time,
        kind: result.kind,
    }))
}

/// API 키 라우터 생성.
pub fn api_keys_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(api_key_status))
        .route("/{exchange}", post(store_api_key).delete(delete_api_key))
        .route("/{exchange}/test", get(test_api_key))
}
