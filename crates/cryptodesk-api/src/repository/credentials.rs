//! 거래소 API 자격증명 저장소.
//!
//! key/secret은 [`CredentialVault`]로 암호화되어 저장되며, 읽을 때 복호화됩니다.
//!
//! # 불변식
//! - (owner, exchange)마다 활성 레코드는 최대 1개
//! - 삭제는 `is_active = false`로만 처리 (행은 감사 기록으로 남음)
//! - 재저장은 활성 레코드를 제자리에서 갱신
//!
//! 복호화 실패는 [`CredentialLookup::DecryptionFailed`]로 구분되어 반환되며,
//! 처리 정책은 호출자가 결정합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use cryptodesk_core::{CredentialVault, CryptoError};
use cryptodesk_exchange::BitvavoCredentials;

/// 인증이 없으므로 단일 사용자로 고정.
pub const CURRENT_USER_ID: i64 = 1;

/// 자격증명을 저장할 수 있는 거래소.
pub const SUPPORTED_EXCHANGES: [&str; 3] = ["bitvavo", "binance", "coinbase"];

/// key/secret 최소 길이 (오입력 방지용)
const MIN_CREDENTIAL_LEN: usize = 10;

/// 저장소 에러.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("{0}")]
    Validation(String),

    /// 활성 레코드 없음 (값은 거래소 이름)
    #[error("No active API key found for {0}")]
    NotFound(String),

    #[error("Encryption error: {0}")]
    Encryption(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 복호화된 자격증명.
///
/// 요청 하나를 처리하는 동안만 보관합니다.
pub struct ApiCredentials {
    pub api_key: String,
    api_secret: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
        }
    }

    pub fn into_bitvavo(self) -> BitvavoCredentials {
        BitvavoCredentials::new(self.api_key, self.api_secret.expose_secret())
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

/// 자격증명 조회 결과.
#[derive(Debug)]
pub enum CredentialLookup {
    Found(ApiCredentials),
    NotFound,
    /// 레코드는 있으나 현재 passphrase로 복호화할 수 없음
    DecryptionFailed(String),
}

impl CredentialLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, CredentialLookup::Found(_))
    }
}

/// 거래소별 자격증명 설정 여부.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub bitvavo: bool,
    pub binance: bool,
    pub coinbase: bool,
}

impl CredentialStatus {
    fn mark(&mut self, exchange: &str) {
        match exchange {
            "bitvavo" => self.bitvavo = true,
            "binance" => self.binance = true,
            "coinbase" => self.coinbase = true,
            _ => {}
        }
    }
}

/// 거래소 이름 정규화 및 검증.
pub fn normalize_exchange(exchange: &str) -> Result<String, CredentialStoreError> {
    let exchange = exchange.trim().to_lowercase();
    if SUPPORTED_EXCHANGES.contains(&exchange.as_str()) {
        Ok(exchange)
    } else {
        Err(CredentialStoreError::Validation(format!(
            "Unsupported exchange. Supported: {}",
            SUPPORTED_EXCHANGES.join(", ")
        )))
    }
}

/// key/secret 형식 검증.
pub fn validate_credentials(api_key: &str, api_secret: &str) -> Result<(), CredentialStoreError> {
    if api_key.is_empty() || api_secret.is_empty() {
        return Err(CredentialStoreError::Validation(
            "Both API key and secret are required".to_string(),
        ));
    }
    if api_key.len() < MIN_CREDENTIAL_LEN || api_secret.len() < MIN_CREDENTIAL_LEN {
        return Err(CredentialStoreError::Validation(
            "API key and secret seem too short".to_string(),
        ));
    }
    Ok(())
}

/// 검증 후 암호화된 (exchange, key, secret).
fn prepare(
    vault: &CredentialVault,
    exchange: &str,
    api_key: &str,
    api_secret: &str,
) -> Result<(String, String, String), CredentialStoreError> {
    let exchange = normalize_exchange(exchange)?;
    validate_credentials(api_key, api_secret)?;
    Ok((exchange, vault.encrypt(api_key)?, vault.encrypt(api_secret)?))
}

fn decrypt_pair(vault: &CredentialVault, exchange: &str, key: &str, secret: &str) -> CredentialLookup {
    match (vault.decrypt(key), vault.decrypt(secret)) {
        (Ok(key), Ok(secret)) => CredentialLookup::Found(ApiCredentials::new(key, secret)),
        (Err(e), _) | (_, Err(e)) => {
            warn!(exchange, error = %e, "Stored credential could not be decrypted");
            CredentialLookup::DecryptionFailed(e.to_string())
        }
    }
}

/// 자격증명 저장소 인터페이스.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 저장 또는 활성 레코드 갱신.
    async fn store(
        &self,
        owner: i64,
        exchange: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<(), CredentialStoreError>;

    /// 거래소별 활성 자격증명 존재 여부.
    async fn status(&self, owner: i64) -> Result<CredentialStatus, CredentialStoreError>;

    /// 활성 레코드 soft delete.
    async fn delete(&self, owner: i64, exchange: &str) -> Result<(), CredentialStoreError>;

    /// 복호화하여 조회.
    async fn load(&self, owner: i64, exchange: &str) -> Result<CredentialLookup, CredentialStoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// api_keys 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub user_id: i64,
    pub exchange: String,
    pub encrypted_api_key: String,
    pub encrypted_api_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PostgreSQL 자격증명 저장소.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    vault: CredentialVault,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, vault: CredentialVault) -> Self {
        Self { pool, vault }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn store(
        &self,
        owner: i64,
        exchange: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<(), CredentialStoreError> {
        let (exchange, encrypted_key, encrypted_secret) = prepare(&self.vault, exchange, api_key, api_secret)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, hashed_password)
            VALUES ($1, 'user_' || $1::text, 'user_' || $1::text || '@example.com', '')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(owner)
        .execute(&mut *tx)
        .await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM api_keys
            WHERE user_id = $1 AND exchange = $2 AND is_active = true
            FOR UPDATE
            "#,
        )
        .bind(owner)
        .bind(&exchange)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE api_keys
                    SET encrypted_api_key = $1, encrypted_api_secret = $2, updated_at = NOW()
                    WHERE id = $3
                    "#,
                )
                .bind(&encrypted_key)
                .bind(&encrypted_secret)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO api_keys (user_id, exchange, encrypted_api_key, encrypted_api_secret, is_active)
                    VALUES ($1, $2, $3, $4, true)
                    "#,
                )
                .bind(owner)
                .bind(&exchange)
                .bind(&encrypted_key)
                .bind(&encrypted_secret)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        info!(exchange = %exchange, owner, "API key stored");
        Ok(())
    }

    async fn status(&self, owner: i64) -> Result<CredentialStatus, CredentialStoreError> {
        let exchanges: Vec<(String,)> =
            sqlx::query_as("SELECT exchange FROM api_keys WHERE user_id = $1 AND is_active = true")
                .bind(owner)
                .fetch_all(&self.pool)
                .await?;

        let mut status = CredentialStatus::default();
        for (exchange,) in &exchanges {
            status.mark(exchange);
        }
        Ok(status)
    }

    async fn delete(&self, owner: i64, exchange: &str) -> Result<(), CredentialStoreError> {
        let exchange = exchange.to_lowercase();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE api_keys SET is_active = false, updated_at = NOW()
            WHERE user_id = $1 AND exchange = $2 AND is_active = true
            "#,
        )
        .bind(owner)
        .bind(&exchange)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(CredentialStoreError::NotFound(exchange));
        }

        tx.commit().await?;
        info!(exchange = %exchange, owner, "API key deactivated");
        Ok(())
    }

    async fn load(&self, owner: i64, exchange: &str) -> Result<CredentialLookup, CredentialStoreError> {
        let exchange = exchange.to_lowercase();
        let record: Option<ApiKeyRecord> = sqlx::query_as(
            r#"
            SELECT * FROM api_keys
            WHERE user_id = $1 AND exchange = $2 AND is_active = true
            "#,
        )
        .bind(owner)
        .bind(&exchange)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match record {
            Some(r) => decrypt_pair(&self.vault, &exchange, &r.encrypted_api_key, &r.encrypted_api_secret),
            None => CredentialLookup::NotFound,
        })
    }
}

// ============================================================================
// 메모리
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryRow {
    owner: i64,
    exchange: String,
    encrypted_api_key: String,
    encrypted_api_secret: String,
    is_active: bool,
}

/// 메모리 자격증명 저장소.
///
/// `DATABASE_URL`이 없을 때와 테스트에서 사용합니다. 프로세스 재시작 시 사라집니다.
#[derive(Debug)]
pub struct InMemoryCredentialStore {
    vault: CredentialVault,
    rows: RwLock<Vec<MemoryRow>>,
}

impl InMemoryCredentialStore {
    pub fn new(vault: CredentialVault) -> Self {
        Self {
            vault,
            rows: RwLock::new(Vec::new()),
        }
    }

    /// 비활성 포함 전체 행 수.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// 암호화를 거치지 않고 행을 추가합니다.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn insert_raw(&self, owner: i64, exchange: &str, encrypted_key: &str, encrypted_secret: &str) {
        self.rows.write().await.push(MemoryRow {
            owner,
            exchange: exchange.to_string(),
            encrypted_api_key: encrypted_key.to_string(),
            encrypted_api_secret: encrypted_secret.to_string(),
            is_active: true,
        });
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn store(
        &self,
        owner: i64,
        exchange: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<(), CredentialStoreError> {
        let (exchange, encrypted_key, encrypted_secret) = prepare(&self.vault, exchange, api_key, api_secret)?;

        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|r| r.owner == owner && r.exchange == exchange && r.is_active)
        {
            Some(row) => {
                row.encrypted_api_key = encrypted_key;
                row.encrypted_api_secret = encrypted_secret;
            }
            None => rows.push(MemoryRow {
                owner,
                exchange: exchange.clone(),
                encrypted_api_key: encrypted_key,
                encrypted_api_secret: encrypted_secret,
                is_active: true,
            }),
        }

        info!(exchange = %exchange, owner, "API key stored");
        Ok(())
    }

    async fn status(&self, owner: i64) -> Result<CredentialStatus, CredentialStoreError> {
        let rows = self.rows.read().await;
        let mut status = CredentialStatus::default();
        for row in rows.iter().filter(|r| r.owner == owner && r.is_active) {
            status.mark(&row.exchange);
        }
        Ok(status)
    }

    async fn delete(&self, owner: i64, exchange: &str) -> Result<(), CredentialStoreError> {
        let exchange = exchange.to_lowercase();
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.owner == owner && r.exchange == exchange && r.is_active)
            .ok_or_else(|| CredentialStoreError::NotFound(exchange.clone()))?;

        row.is_active = false;
        info!(exchange = %exchange, owner, "API key deactivated");
        Ok(())
    }

    async fn load(&self, owner: i64, exchange: &str) -> Result<CredentialLookup, CredentialStoreError> {
        let exchange = exchange.to_lowercase();
        let rows = self.rows.read().await;
        Ok(
            match rows
                .iter()
                .find(|r| r.owner == owner && r.exchange == exchange && r.is_active)
            {
                Some(r) => decrypt_pair(&self.vault, &exchange, &r.encrypted_api_key, &r.encrypted_api_secret),
                None => CredentialLookup::NotFound,
            },
        )
    }
}
