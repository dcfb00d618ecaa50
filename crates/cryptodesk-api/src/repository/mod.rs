//! Repository pattern for database operations.
//!
//! 데이터베이스 접근 로직을 라우트 핸들러에서 분리하여 관리합니다.
//! 포트폴리오 저장소는 static methods 패턴을, 자격증명 저장소는 trait 객체를 사용합니다.

pub mod credentials;
pub mod portfolio;

pub use credentials::{
    normalize_exchange, validate_credentials, ApiCredentials, ApiKeyRecord, CredentialLookup,
    CredentialStatus, CredentialStore, CredentialStoreError, InMemoryCredentialStore,
    PgCredentialStore, CURRENT_USER_ID, SUPPORTED_EXCHANGES,
};
pub use portfolio::{
    position_change, PortfolioRecord, PortfolioRepository, PositionChange, PositionRecord, TradeRow,
};
