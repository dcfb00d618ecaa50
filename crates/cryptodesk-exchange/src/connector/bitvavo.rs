//! Bitvavo 거래소 커넥터.
//!
//! REST API v2 서명 요청 구현.
//! 서명 대상 문자열: `timestamp + METHOD + "/v2" + endpoint(+query) + body`

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error};
use url::form_urlencoded;

use cryptodesk_core::ExchangeConfig;

use crate::error::{map_http_error, ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

/// 서명 경로 접두사.
const SIGN_PATH_PREFIX: &str = "/v2";

/// 기본 REST URL.
pub const DEFAULT_REST_URL: &str = "https://api.bitvavo.com/v2";

const HEADER_ACCESS_KEY: &str = "bitvavo-access-key";
const HEADER_ACCESS_SIGNATURE: &str = "bitvavo-access-signature";
const HEADER_ACCESS_TIMESTAMP: &str = "bitvavo-access-timestamp";

fn user_agent() -> String {
    format!("cryptodesk/{}", env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// 설정
// ============================================================================

/// API key/secret 쌍.
///
/// 요청 하나를 처리하는 동안만 존재하며 캐시하지 않습니다.
pub struct BitvavoCredentials {
    pub api_key: String,
    api_secret: SecretString,
}

impl BitvavoCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
        }
    }

    fn secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

impl fmt::Debug for BitvavoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = if self.api_key.chars().count() > 8 {
            let head: String = self.api_key.chars().take(4).collect();
            let tail: String = {
                let mut tail: Vec<char> = self.api_key.chars().rev().take(4).collect();
                tail.reverse();
                tail.into_iter().collect()
            };
            format!("{}...{}", head, tail)
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("BitvavoCredentials")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}

/// Bitvavo 클라이언트 설정.
#[derive(Debug)]
pub struct BitvavoConfig {
    /// REST API 기본 URL (`/v2` 포함)
    pub rest_base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 없으면 인증 헤더 없이 요청 (공개 엔드포인트만 동작)
    pub credentials: Option<BitvavoCredentials>,
}

impl Default for BitvavoConfig {
    fn default() -> Self {
        Self {
            rest_base_url: DEFAULT_REST_URL.to_string(),
            timeout_secs: 30,
            credentials: None,
        }
    }
}

impl BitvavoConfig {
    /// 자격증명과 함께 생성.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self::default().with_credentials(Some(BitvavoCredentials::new(api_key, api_secret)))
    }

    /// 애플리케이션 설정에서 생성. 설정에 key/secret이 있으면 사용합니다.
    pub fn from_exchange_config(config: &ExchangeConfig) -> Self {
        let credentials = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(BitvavoCredentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        };

        Self {
            rest_base_url: config.rest_url.clone(),
            timeout_secs: config.timeout_secs,
            credentials,
        }
    }

    /// 환경 변수(`BITVAVO_API_KEY`, `BITVAVO_API_SECRET`)에서 생성.
    pub fn from_env() -> Self {
        let key = std::env::var("BITVAVO_API_KEY").ok().filter(|k| !k.is_empty());
        let secret = std::env::var("BITVAVO_API_SECRET").ok().filter(|s| !s.is_empty());
        let credentials = key.zip(secret).map(|(k, s)| BitvavoCredentials::new(k, s));

        Self {
            rest_base_url: std::env::var("BITVAVO_REST_URL").unwrap_or_else(|_| DEFAULT_REST_URL.to_string()),
            credentials,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<BitvavoCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

// ============================================================================
// 서명
// ============================================================================

/// 요청 서명 (소문자 hex HMAC-SHA256).
///
/// `path`는 `/v2`를 포함한 경로입니다.
pub fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Unauthorized(format!("Invalid API secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// percent-encoding된 쿼리 문자열. 서명과 전송에 같은 문자열을 사용합니다.
fn build_query(params: &[(&str, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish()
}

// ============================================================================
// 클라이언트
// ============================================================================

/// Bitvavo REST 클라이언트.
pub struct BitvavoClient {
    config: BitvavoConfig,
    http: Client,
}

impl BitvavoClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::Network`를 반환합니다.
    pub fn new(config: BitvavoConfig) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// 공유 HTTP 클라이언트로 생성.
    ///
    /// 요청마다 자격증명이 달라질 때 커넥션 풀을 재사용합니다.
    pub fn with_http_client(config: BitvavoConfig, http: Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &BitvavoConfig {
        &self.config
    }

    /// key와 secret이 모두 설정되어 있는지.
    pub fn has_credentials(&self) -> bool {
        self.config.credentials.is_some()
    }

    /// 요청 실행.
    ///
    /// 자격증명이 있으면 인증 헤더를 붙입니다. 2xx가 아니면 [`map_http_error`]로 변환합니다.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ExchangeResult<Value> {
        let query_string = build_query(query);
        let path = if query_string.is_empty() {
            endpoint.to_string()
        } else {
            format!("{}?{}", endpoint, query_string)
        };
        let url = format!("{}{}", self.config.rest_base_url.trim_end_matches('/'), path);

        let body_text = match body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, user_agent());

        if let Some(credentials) = &self.config.credentials {
            let timestamp = Utc::now().timestamp_millis().to_string();
            let signature = sign(
                credentials.secret(),
                &timestamp,
                method.as_str(),
                &format!("{}{}", SIGN_PATH_PREFIX, path),
                &body_text,
            )?;
            request = request
                .header(HEADER_ACCESS_KEY, &credentials.api_key)
                .header(HEADER_ACCESS_SIGNATURE, signature)
                .header(HEADER_ACCESS_TIMESTAMP, timestamp);
        }

        if body.is_some() {
            request = request.body(body_text);
        }

        debug!(method = %method, endpoint, signed = self.has_credentials(), "Bitvavo request");

        let response = request.send().await?;
        Self::handle_response(response).await
    }

    pub async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> ExchangeResult<Value> {
        self.request(Method::GET, endpoint, query, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> ExchangeResult<Value> {
        self.request(Method::POST, endpoint, &[], Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str, query: &[(&str, String)]) -> ExchangeResult<Value> {
        self.request(Method::DELETE, endpoint, query, None).await
    }

    /// API 응답 처리.
    async fn handle_response(response: reqwest::Response) -> ExchangeResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ExchangeError::Parse(e.to_string())
            })
        } else {
            let err = map_http_error(status.as_u16(), &body);
            debug!(status = status.as_u16(), error = %err, "Bitvavo error response");
            Err(err)
        }
    }
}

impl fmt::Debug for BitvavoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitvavoClient")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        let body = r#"{"market":"BTC-EUR","side":"buy","price":"5000","amount":"1.23","orderType":"limit"}"#;
        let signature = sign("bitvavo", "1548172481125", "POST", "/v2/order", body).unwrap();
        assert_eq!(
            signature,
            "44d022723a20973a18f7ee97398b9fdd405d2d019c8d39e24b8cc0dcb39ca016"
        );
    }

    #[test]
    fn test_sign_uppercases_method() {
        let lower = sign("secret-secret", "1700000000000", "get", "/v2/time", "").unwrap();
        assert_eq!(
            lower,
            "6ce5e2cfa9b1edf810952fcc505ab8584d070e5636a919a5feb89ae22fc90c1a"
        );
    }

    #[test]
    fn test_debug_masks_credentials() {
        let config = BitvavoConfig::new("abcdefghijklmnop", "super-secret-value");
        let debug = format!("{:?}", config);

        assert!(debug.contains("abcd...mnop"));
        assert!(!debug.contains("super-secret-value"));
        assert!(!debug.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_from_exchange_config() {
        let mut exchange = ExchangeConfig::default();
        assert!(BitvavoConfig::from_exchange_config(&exchange).credentials.is_none());

        exchange.api_key = Some("key".into());
        exchange.api_secret = Some(String::new());
        assert!(BitvavoConfig::from_exchange_config(&exchange).credentials.is_none());

        exchange.api_secret = Some("secret".into());
        let config = BitvavoConfig::from_exchange_config(&exchange);
        assert!(config.credentials.is_some());
        assert_eq!(config.rest_base_url, DEFAULT_REST_URL);
    }

    #[test]
    fn test_build_query() {
        assert_eq!(build_query(&[]), "");
        assert_eq!(
            build_query(&[("market", "BTC-EUR".into()), ("limit", "10".into())]),
            "market=BTC-EUR&limit=10"
        );
    }

    #[test]
    fn test_build_query_encodes_reserved_characters() {
        assert_eq!(
            build_query(&[("market", "BTC-EUR&limit=1".into())]),
            "market=BTC-EUR%26limit%3D1"
        );
        assert_eq!(build_query(&[("orderId", "a#b c".into())]), "orderId=a%23b+c");
    }

    #[test]
    fn test_debug_masks_non_ascii_key() {
        let config = BitvavoConfig::new("abcé-key-0123456789", "super-secret-value");
        let debug = format!("{:?}", config);

        assert!(debug.contains("abcé...6789"));
        assert!(!debug.contains("super-secret-value"));
    }
}
