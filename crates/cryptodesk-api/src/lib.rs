//! Bitvavo 트레이딩 게이트웨이 REST API 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Axum 기반 REST API
//! - 암호화된 거래소 API 키 저장소
//! - dry run / demo / live 모드 게이트를 거치는 주문 endpoint
//! - 포트폴리오 및 거래 내역 저장
//! - 헬스 체크 엔드포인트
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`repository`]: 자격증명 저장소와 포트폴리오 저장소
//! - [`error`]: API 에러 응답

pub mod error;
pub mod repository;
pub mod routes;
pub mod state;

pub use error::{ApiErrorResponse, ApiResult};
pub use repository::{
    CredentialStore, CredentialStoreError, InMemoryCredentialStore, PgCredentialStore,
};
pub use routes::*;
pub use state::AppState;

#[cfg(any(test, feature = "test-utils"))]
pub use state::{create_test_state, create_test_state_with, test_credential_store};
