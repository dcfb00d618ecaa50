//! 도메인 계층 에러 타입.
//!
//! 순수 계산 함수(포트폴리오, 리스크, 시장 지표)와 설정 로딩에서 사용합니다.

use thiserror::Error;

/// 도메인 에러.
#[derive(Debug, Error)]
pub enum DomainError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 잘못된 마켓 형식
    #[error("Invalid market format: {0}")]
    InvalidMarket(String),

    /// 잔고 부족
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },
}

/// 도메인 작업 Result 타입.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// 사용자 입력 문제로 인한 에러인지 확인합니다.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidInput(_) | DomainError::InvalidMarket(_)
        )
    }
}

impl From<config::ConfigError> for DomainError {
    fn from(err: config::ConfigError) -> Self {
        DomainError::Config(err.to_string())
    }
}
