//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 모든 API 핸들러에서 공유되는 상태를 관리합니다.
//! Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.
//!
//! 모드 게이트와 rate limiter는 프로세스에 하나씩 존재하며 여기서 주입됩니다.
//! 거래소 게이트웨이는 요청마다 해당 요청의 자격증명으로 생성됩니다.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::warn;

use cryptodesk_core::{AppConfig, TradingModeGate};
use cryptodesk_exchange::{
    BitvavoClient, BitvavoConfig, BitvavoCredentials, ExchangeError, ExchangeGateway,
    ExchangeResult, SimulationEngine, SlidingWindowLimiter,
};

use crate::repository::{CredentialLookup, CredentialStore, CredentialStoreError, CURRENT_USER_ID};

/// 거래에 사용하는 거래소.
pub const TRADING_EXCHANGE: &str = "bitvavo";

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 애플리케이션 설정
    pub config: Arc<AppConfig>,

    /// 트레이딩 모드 게이트 (dry run / demo / live)
    pub mode_gate: Arc<TradingModeGate>,

    /// 거래소 요청 rate limiter (프로세스 공유)
    pub limiter: Arc<SlidingWindowLimiter>,

    /// dry-run 응답 생성기
    pub simulation: Arc<SimulationEngine>,

    /// 암호화된 API 자격증명 저장소
    pub credentials: Arc<dyn CredentialStore>,

    /// 공유 HTTP 클라이언트 (커넥션 풀 재사용)
    pub http: reqwest::Client,

    /// 데이터베이스 연결 풀. 없으면 포트폴리오 기능 비활성화
    pub db_pool: Option<PgPool>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 설정과 자격증명 저장소로 상태 생성.
    ///
    /// 모드 게이트는 `trading.mode`, `trading.dry_run_enabled`로 초기화됩니다.
    pub fn new(config: AppConfig, credentials: Arc<dyn CredentialStore>) -> ExchangeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.exchange.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let mode_gate = TradingModeGate::new(config.trading.mode, config.trading.dry_run_enabled);
        let limiter = SlidingWindowLimiter::new(config.exchange.rate_limit_per_minute);
        let simulation = SimulationEngine::new(config.simulation.clone());

        Ok(Self {
            config: Arc::new(config),
            mode_gate: Arc::new(mode_gate),
            limiter: Arc::new(limiter),
            simulation: Arc::new(simulation),
            credentials,
            http,
            db_pool: None,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// 데이터베이스 연결 풀 설정.
    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// 주어진 자격증명으로 게이트웨이 생성.
    pub fn gateway_with(&self, credentials: Option<BitvavoCredentials>) -> ExchangeGateway {
        let config = BitvavoConfig::from_exchange_config(&self.config.exchange).with_credentials(credentials);
        ExchangeGateway::new(
            BitvavoClient::with_http_client(config, self.http.clone()),
            Arc::clone(&self.mode_gate),
            Arc::clone(&self.limiter),
            Arc::clone(&self.simulation),
        )
    }

    /// 인증 없는 게이트웨이 (시세 조회용).
    pub fn public_gateway(&self) -> ExchangeGateway {
        self.gateway_with(None)
    }

    /// 거래용 게이트웨이.
    ///
    /// 저장된 자격증명을 우선 사용하고, 없거나 복호화할 수 없으면 설정의 key/secret을 사용합니다.
    pub async fn trading_gateway(&self) -> Result<ExchangeGateway, CredentialStoreError> {
        let credentials = match self.credentials.load(CURRENT_USER_ID, TRADING_EXCHANGE).await? {
            CredentialLookup::Found(credentials) => Some(credentials.into_bitvavo()),
            CredentialLookup::NotFound => self.config_credentials(),
            CredentialLookup::DecryptionFailed(cause) => {
                warn!(
                    exchange = TRADING_EXCHANGE,
                    cause = %cause,
                    "Stored credentials unusable, falling back to configured credentials"
                );
                self.config_credentials()
            }
        };
        Ok(self.gateway_with(credentials))
    }

    fn config_credentials(&self) -> Option<BitvavoCredentials> {
        BitvavoConfig::from_exchange_config(&self.config.exchange).credentials
    }

    /// 거래에 사용할 자격증명이 있는지 (저장소 또는 설정).
    pub async fn credentials_configured(&self) -> bool {
        if self.config.exchange.has_credentials() {
            return true;
        }
        match self.credentials.load(CURRENT_USER_ID, TRADING_EXCHANGE).await {
            Ok(lookup) => lookup.is_found(),
            Err(e) => {
                warn!(error = %e, "Credential lookup failed");
                false
            }
        }
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 데이터베이스 연결 상태 확인.
    pub async fn is_db_healthy(&self) -> bool {
        if let Some(pool) = &self.db_pool {
            sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
        } else {
            false
        }
    }
}

/// 테스트용 AppState 생성.
///
/// 기본 설정(dry run)과 메모리 자격증명 저장소를 사용합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    create_test_state_with(AppConfig::default(), test_credential_store())
}

/// 설정과 저장소를 지정하여 테스트용 AppState 생성.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(config: AppConfig, credentials: Arc<dyn CredentialStore>) -> AppState {
    AppState::new(config, credentials).expect("Failed to create test state")
}

/// 테스트용 메모리 자격증명 저장소.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_credential_store() -> Arc<crate::repository::InMemoryCredentialStore> {
    let vault = cryptodesk_core::CredentialVault::new("test-passphrase").expect("Failed to create vault");
    Arc::new(crate::repository::InMemoryCredentialStore::new(vault))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptodesk_core::TradingMode;

    #[test]
    fn test_state_follows_trading_config() {
        let state = create_test_state();
        assert_eq!(state.mode_gate.current_mode(), TradingMode::DryRun);
        assert!(state.mode_gate.is_dry_run_enabled());
        assert_eq!(
            state.limiter.max_per_minute(),
            state.config.exchange.rate_limit_per_minute
        );
        assert!(state.db_pool.is_none());
    }

    #[tokio::test]
    async fn test_trading_gateway_prefers_stored_credentials() {
        let state = create_test_state();
        assert!(!state.credentials_configured().await);
        assert!(!state.trading_gateway().await.unwrap().has_credentials());

        state
            .credentials
            .store(CURRENT_USER_ID, "bitvavo", "kkkkkkkkkkkkkkkkkkkk", "ssssssssssssssssssss")
            .await
            .unwrap();

        assert!(state.credentials_configured().await);
        assert!(state.trading_gateway().await.unwrap().has_credentials());
        assert!(!state.public_gateway().has_credentials());
    }

    #[tokio::test]
    async fn test_undecryptable_credentials_fall_back_to_config() {
        let store = test_credential_store();
        let other = cryptodesk_core::CredentialVault::new("another-passphrase").unwrap();
        store
            .insert_raw(
                CURRENT_USER_ID,
                "bitvavo",
                &other.encrypt("kkkkkkkkkkkkkkkkkkkk").unwrap(),
                &other.encrypt("ssssssssssssssssssss").unwrap(),
            )
            .await;

        let mut config = AppConfig::default();
        config.exchange.api_key = Some("config-key-0123456789".into());
        config.exchange.api_secret = Some("config-secret-0123456789".into());

        let state = create_test_state_with(config, store);
        assert!(state.trading_gateway().await.unwrap().has_credentials());
        assert!(state.credentials_configured().await);
    }
}
