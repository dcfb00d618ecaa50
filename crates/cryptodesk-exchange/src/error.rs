//! 거래소 에러 타입.
//!
//! HTTP 상태 코드와 거래소 `errorCode`로 분류합니다. 메시지 문자열은 분류에 쓰지 않습니다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 거래소 잔고 부족 에러 코드.
const BITVAVO_INSUFFICIENT_BALANCE: i64 = 216;

/// 네트워크 에러 재시도 권장 대기 시간 (초)
const NETWORK_RETRY_SECS: u64 = 30;

/// 거래소 응답 429 시 권장 대기 시간 (초)
pub const RATE_LIMIT_RETRY_SECS: u64 = 60;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 자격증명 미설정
    #[error("API credentials not configured")]
    CredentialsMissing,

    /// 실거래 비활성 상태에서 실주문 시도
    #[error("Live trading not enabled. Check trading mode configuration.")]
    LiveTradingDisabled,

    /// 실거래 요건 미충족
    #[error("Live trading validation failed: {0}")]
    LiveTradingRequirements(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded. Try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    /// 인증/권한 에러
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// 잔고 부족
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 그 외 거래소 에러 응답
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O 전에 거부된 주문 파라미터
    #[error("{0}")]
    InvalidOrder(String),

    /// 리소스를 찾을 수 없음
    #[error("Not found: {0}")]
    NotFound(String),
}

/// 거래소 작업 결과 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkError,
    RateLimit,
    AuthError,
    BalanceError,
    ApiError,
    ValidationError,
    DryRunError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::BalanceError => "balance_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::DryRunError => "dry_run_error",
        }
    }
}

impl ExchangeError {
    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::Network(_) | ExchangeError::Timeout(_) => ErrorKind::NetworkError,
            ExchangeError::RateLimited { .. } => ErrorKind::RateLimit,
            ExchangeError::Unauthorized(_) | ExchangeError::CredentialsMissing => ErrorKind::AuthError,
            ExchangeError::InsufficientBalance(_) => ErrorKind::BalanceError,
            ExchangeError::InvalidOrder(_) => ErrorKind::ValidationError,
            ExchangeError::LiveTradingDisabled | ExchangeError::LiveTradingRequirements(_) => {
                ErrorKind::DryRunError
            }
            ExchangeError::Api { .. } | ExchangeError::Parse(_) | ExchangeError::NotFound(_) => {
                ErrorKind::ApiError
            }
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::RateLimited { .. }
        )
    }

    /// 권장 재시도 대기 시간(초).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            ExchangeError::Network(_) | ExchangeError::Timeout(_) => Some(NETWORK_RETRY_SECS),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitvavoErrorBody {
    error_code: Option<i64>,
    error: Option<String>,
}

/// 2xx가 아닌 응답을 에러로 변환.
///
/// | 조건 | 결과 |
/// |------|------|
/// | 401, 403 | `Unauthorized` |
/// | 429 | `RateLimited(60)` |
/// | 404 | `NotFound` |
/// | 408 | `Timeout` |
/// | 5xx | `Network` |
/// | errorCode 216 | `InsufficientBalance` |
/// | 그 외 | `Api` |
pub fn map_http_error(status: u16, body: &str) -> ExchangeError {
    let parsed = serde_json::from_str::<BitvavoErrorBody>(body).ok();
    let code = parsed.as_ref().and_then(|b| b.error_code);
    let message = parsed
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        401 | 403 => ExchangeError::Unauthorized(message),
        429 => ExchangeError::RateLimited {
            retry_after_secs: RATE_LIMIT_RETRY_SECS,
        },
        404 => ExchangeError::NotFound(message),
        408 => ExchangeError::Timeout(message),
        500..=599 => ExchangeError::Network(message),
        _ if code == Some(BITVAVO_INSUFFICIENT_BALANCE) => ExchangeError::InsufficientBalance(message),
        _ => ExchangeError::Api {
            status,
            code,
            message,
        },
    }
}

/// 호출자에게 전달되는 에러 요약.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    /// 항상 "error"
    pub status: &'static str,
    pub message: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// 에러를 사용자용 메시지와 분류로 변환.
pub fn classify_error(error: &ExchangeError) -> ErrorClassification {
    let kind = error.kind();
    let message = match kind {
        ErrorKind::NetworkError => {
            "Network connection failed. Please check your internet connection.".to_string()
        }
        ErrorKind::RateLimit => "Rate limit exceeded. Please wait before making more requests.".to_string(),
        ErrorKind::AuthError => "Authentication failed. Please check your API credentials.".to_string(),
        ErrorKind::BalanceError => "Insufficient balance for this operation.".to_string(),
        _ => format!("API error: {}", error),
    };

    ErrorClassification {
        status: "error",
        message,
        kind,
        retry_after: error.retry_after_secs(),
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_http_error(401, "{}"), ExchangeError::Unauthorized(_)));
        assert!(matches!(map_http_error(403, ""), ExchangeError::Unauthorized(_)));
        assert!(matches!(
            map_http_error(429, ""),
            ExchangeError::RateLimited { retry_after_secs: 60 }
        ));
        assert!(matches!(map_http_error(404, ""), ExchangeError::NotFound(_)));
        assert!(matches!(map_http_error(408, ""), ExchangeError::Timeout(_)));
        assert!(matches!(map_http_error(502, "bad gateway"), ExchangeError::Network(_)));
    }

    #[test]
    fn test_exchange_error_code_mapping() {
        let body = r#"{"errorCode": 216, "error": "You do not have sufficient balance to complete this operation."}"#;
        match map_http_error(400, body) {
            ExchangeError::InsufficientBalance(msg) => assert!(msg.contains("sufficient balance")),
            other => panic!("unexpected: {other:?}"),
        }

        let body = r#"{"errorCode": 205, "error": "Invalid parameter."}"#;
        match map_http_error(400, body) {
            ExchangeError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(205));
                assert_eq!(message, "Invalid parameter.");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_non_json_body_kept_as_message() {
        match map_http_error(418, " teapot ") {
            ExchangeError::Api { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "teapot");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classification() {
        let network = classify_error(&ExchangeError::Network("refused".into()));
        assert_eq!(network.kind, ErrorKind::NetworkError);
        assert_eq!(network.retry_after, Some(30));

        let limited = classify_error(&ExchangeError::RateLimited { retry_after_secs: 60 });
        assert_eq!(limited.kind.as_str(), "rate_limit");
        assert_eq!(limited.retry_after, Some(60));

        let auth = classify_error(&ExchangeError::Unauthorized("bad key".into()));
        assert_eq!(auth.kind, ErrorKind::AuthError);
        assert_eq!(auth.retry_after, None);

        let other = classify_error(&ExchangeError::Parse("eof".into()));
        assert_eq!(other.message, "API error: Parse error: eof");
    }

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::Timeout("t".into()).is_retryable());
        assert!(!ExchangeError::CredentialsMissing.is_retryable());
        assert!(!ExchangeError::InvalidOrder("x".into()).is_retryable());
    }
}
