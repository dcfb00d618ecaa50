//! 통합 API 에러 응답 타입.
//!
//! 모든 핸들러는 `ApiResult<T>`를 반환하고, 에러는 다음 형식으로 직렬화됩니다.
//!
//! ```json
//! {
//!   "code": "RATE_LIMITED",
//!   "detail": "Rate limit exceeded. Try again in 60 seconds.",
//!   "retry_after": 60,
//!   "timestamp": 1738300800
//! }
//! ```

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cryptodesk_exchange::ExchangeError;

use crate::repository::CredentialStoreError;

/// 통합 API 에러 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "VALIDATION_ERROR", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub detail: String,
    /// rate limit 에러의 권장 대기 시간 (초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Unix timestamp
    pub timestamp: i64,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
            retry_after: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after = secs;
        self
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.detail)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 에러 타입.
pub type ApiError = (StatusCode, Json<ApiErrorResponse>);

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;

/// 상태 코드와 메시지로 에러 생성.
pub fn api_error(status: StatusCode, code: &str, detail: impl Into<String>) -> ApiError {
    (status, Json(ApiErrorResponse::new(code, detail)))
}

pub fn bad_request(detail: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", detail)
}

pub fn not_found(detail: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "NOT_FOUND", detail)
}

pub fn internal_error(detail: impl Into<String>) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", detail)
}

/// DB가 설정되지 않은 경우.
pub fn database_unavailable() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "DATABASE_UNAVAILABLE",
        "Database not configured",
    )
}

/// 거래소 에러 → HTTP 상태 코드.
///
/// | 에러 | 상태 |
/// |------|------|
/// | 검증, 모드, 자격증명 누락 | 400 |
/// | rate limit | 429 (+ `retry_after`) |
/// | 인증 | 401 |
/// | 타임아웃 | 408 |
/// | 네트워크 | 503 |
/// | 그 외 | 400 |
pub fn exchange_status(error: &ExchangeError) -> (StatusCode, &'static str) {
    match error {
        ExchangeError::InvalidOrder(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        ExchangeError::CredentialsMissing => (StatusCode::BAD_REQUEST, "CREDENTIALS_MISSING"),
        ExchangeError::LiveTradingDisabled | ExchangeError::LiveTradingRequirements(_) => {
            (StatusCode::BAD_REQUEST, "LIVE_TRADING_DISABLED")
        }
        ExchangeError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        ExchangeError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
        ExchangeError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT"),
        ExchangeError::Network(_) => (StatusCode::SERVICE_UNAVAILABLE, "NETWORK_ERROR"),
        ExchangeError::InsufficientBalance(_) => (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE"),
        ExchangeError::NotFound(_) => (StatusCode::BAD_REQUEST, "NOT_FOUND"),
        ExchangeError::Api { .. } | ExchangeError::Parse(_) => (StatusCode::BAD_REQUEST, "EXCHANGE_ERROR"),
    }
}

/// 거래소 에러를 API 에러로 변환.
pub fn from_exchange(error: ExchangeError) -> ApiError {
    let (status, code) = exchange_status(&error);
    let retry_after = match error {
        ExchangeError::RateLimited { retry_after_secs } => Some(retry_after_secs),
        _ => None,
    };
    (
        status,
        Json(ApiErrorResponse::new(code, error.to_string()).with_retry_after(retry_after)),
    )
}

/// 자격증명 저장소 에러를 API 에러로 변환.
pub fn from_store(error: CredentialStoreError) -> ApiError {
    match error {
        CredentialStoreError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
        CredentialStoreError::NotFound(exchange) => {
            not_found(format!("No active API key found for {}", exchange))
        }
        CredentialStoreError::Encryption(e) => {
            tracing::error!(error = %e, "Credential encryption failed");
            internal_error("Error storing API key")
        }
        CredentialStoreError::Database(e) => {
            tracing::error!(error = %e, "Credential store database error");
            internal_error("Error storing API key")
        }
    }
}

/// DB 에러를 API 에러로 변환.
pub fn from_db(error: sqlx::Error) -> ApiError {
    tracing::error!(error = %error, "Database error");
    internal_error("Database error")
}

/// 요청 검증 에러를 API 에러로 변환.
///
/// 필드별 메시지를 `; `로 연결합니다.
pub fn from_validation(errors: validator::ValidationErrors) -> ApiError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: invalid value", field))
            })
        })
        .collect();
    messages.sort();
    api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", messages.join("; "))
}
