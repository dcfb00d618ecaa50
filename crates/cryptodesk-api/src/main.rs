//! Cryptodesk API 서버.
//!
//! 설정을 로드하고 자격증명 저장소와 공유 상태를 구성한 뒤 Axum REST API 서버를 시작합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use cryptodesk_api::repository::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
use cryptodesk_api::routes::create_api_router;
use cryptodesk_api::state::AppState;
use cryptodesk_core::{
    init_logging, AppConfig, CredentialVault, DatabaseConfig, LogConfig, ServerConfig,
};

/// 데이터베이스 연결 및 마이그레이션.
///
/// 실패하면 `None`을 반환하고 DB 기능 없이 계속 진행합니다.
async fn connect_database(config: &DatabaseConfig) -> Option<PgPool> {
    let Some(url) = config.url.as_deref() else {
        warn!("DATABASE_URL not set, using in-memory credential store and disabling portfolio features");
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return None;
        }
    };

    if let Err(e) = sqlx::migrate!("../../migrations").run(&pool).await {
        error!("Failed to run database migrations: {}", e);
        return None;
    }

    info!("Connected to PostgreSQL and applied migrations");
    Some(pool)
}

/// CORS 레이어 생성.
///
/// `server.cors_origins`가 비어 있으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origin_list()
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let restricted = !origins.is_empty();
    let allow_origin = if restricted {
        info!("CORS configured with {} allowed origins", origins.len());
        AllowOrigin::list(origins)
    } else {
        warn!("CORS origins not set, allowing any origin (development mode)");
        AllowOrigin::any()
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(restricted)
        .max_age(Duration::from_secs(3600))
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>) -> Router {
    let config = Arc::clone(&state.config);

    create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(cors_layer(&config.server))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default()?;
    init_logging(LogConfig::from(&config.logging)).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    info!("Starting Cryptodesk API server...");

    if config.security.uses_default_passphrase() {
        warn!("DB_ENCRYPTION_KEY not set, using default passphrase (INSECURE for development only)");
    }
    let vault = CredentialVault::new(&config.security.encryption_passphrase)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "소켓 주소 설정이 유효하지 않습니다. API_HOST, API_PORT 환경변수를 확인하세요."
            );
            e
        })?;

    let pool = connect_database(&config.database).await;
    let credentials: Arc<dyn CredentialStore> = match &pool {
        Some(pool) => Arc::new(PgCredentialStore::new(pool.clone(), vault)),
        None => Arc::new(InMemoryCredentialStore::new(vault)),
    };

    let mut state = AppState::new(config, credentials)?;
    if let Some(pool) = pool {
        state = state.with_db_pool(pool);
    }
    let state = Arc::new(state);

    let snapshot = state.mode_gate.snapshot();
    info!(
        version = %state.version,
        has_db = state.db_pool.is_some(),
        has_config_credentials = state.config.exchange.has_credentials(),
        trading_mode = snapshot.current_mode.as_str(),
        dry_run = snapshot.dry_run_enabled,
        "Application state initialized"
    );
    if snapshot.is_live_trading {
        warn!("{}", snapshot.warning_message);
    } else {
        info!("{}", snapshot.warning_message);
    }

    let app = create_router(state);

    info!(%addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 반환합니다.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
