//! 설정 관리.
//!
//! 적용 순서 (뒤가 우선):
//! 1. 내장 기본값
//! 2. `config/default.toml` (선택)
//! 3. `CRYPTODESK__SECTION__KEY` 형식의 환경 변수
//! 4. 기존 단일 환경 변수 (`DATABASE_URL`, `BITVAVO_API_KEY`, `TRADING_MODE` 등)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::DEFAULT_PASSPHRASE;
use crate::trading_mode::TradingMode;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 허용 CORS origin (쉼표 구분)
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 60,
            cors_origins: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    /// CORS origin 목록.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// 데이터베이스 설정.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 연결 URL. 없으면 메모리 저장소로 동작합니다.
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "***"))
            .field("max_connections", &self.max_connections)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

/// 거래소 설정.
#[derive(Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// REST API 기본 URL
    pub rest_url: String,
    /// API key (선택, Credential Store에서 올 수도 있음)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// HTTP 타임아웃 (초)
    pub timeout_secs: u64,
    /// 분당 요청 가중치 한도
    pub rate_limit_per_minute: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.bitvavo.com/v2".to_string(),
            api_key: None,
            api_secret: None,
            timeout_secs: 30,
            rate_limit_per_minute: 1000,
        }
    }
}

impl ExchangeConfig {
    /// key와 secret이 모두 비어있지 않은지 확인.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.api_key, &self.api_secret),
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty()
        )
    }
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("rest_url", &self.rest_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish()
    }
}

/// 트레이딩 모드 기본값.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    pub mode: TradingMode,
    /// 시작 시 dry-run override 활성화 여부
    pub dry_run_enabled: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::DryRun,
            dry_run_enabled: true,
        }
    }
}

/// 보안 설정.
#[derive(Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// 자격증명 암호화 passphrase
    pub encryption_passphrase: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_passphrase: DEFAULT_PASSPHRASE.to_string(),
        }
    }
}

impl SecurityConfig {
    /// 기본 passphrase 사용 여부.
    pub fn uses_default_passphrase(&self) -> bool {
        self.encryption_passphrase == DEFAULT_PASSPHRASE
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_passphrase", &"***")
            .finish()
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty, json, compact
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 시뮬레이션 잔고 항목.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatedBalance {
    pub symbol: String,
    /// 거래소 형식 그대로 문자열 보관 (예: "10000.00")
    pub available: String,
}

impl SimulatedBalance {
    fn new(symbol: &str, available: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            available: available.to_string(),
        }
    }
}

/// dry-run/demo 응답 생성용 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub balances: Vec<SimulatedBalance>,
    /// 가격 미지정 시장가 주문의 체결가
    pub default_fill_price: f64,
    pub fee_rate: String,
    pub fee_currency: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            balances: vec![
                SimulatedBalance::new("EUR", "10000.00"),
                SimulatedBalance::new("BTC", "0.1"),
                SimulatedBalance::new("ETH", "2.5"),
            ],
            default_fill_price: 45000.0,
            fee_rate: "0.0025".to_string(),
            fee_currency: "EUR".to_string(),
        }
    }
}

/// 단일 환경 변수 → 설정 키 매핑.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("BITVAVO_API_KEY", "exchange.api_key"),
    ("BITVAVO_API_SECRET", "exchange.api_secret"),
    ("BITVAVO_REST_URL", "exchange.rest_url"),
    ("RATE_LIMIT_PER_MINUTE", "exchange.rate_limit_per_minute"),
    ("TRADING_MODE", "trading.mode"),
    ("DRY_RUN_ENABLED", "trading.dry_run_enabled"),
    ("DB_ENCRYPTION_KEY", "security.encryption_passphrase"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
    ("API_HOST", "server.host"),
    ("API_PORT", "server.port"),
    ("CORS_ORIGINS", "server.cors_origins"),
];

impl AppConfig {
    /// 파일(선택)과 환경 변수에서 설정 로드.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// 기본 경로(`config/default.toml`)에서 설정 로드.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// 환경 변수 조회 함수를 주입받아 로드 (테스트용).
    pub fn load_with<P, F>(path: P, lookup: F) -> Result<Self, config::ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("CRYPTODESK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (env_key, config_key) in LEGACY_ENV_KEYS {
            builder = builder.set_override_option(*config_key, lookup(env_key))?;
        }

        builder.build()?.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            exchange: ExchangeConfig::default(),
            trading: TradingConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}
