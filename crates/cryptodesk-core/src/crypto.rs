//! # 자격증명 보관소 (Credential Vault)
//!
//! 거래소 API key/secret을 저장 전에 암호화하고 조회 시 복호화합니다.
//!
//! ## 보안 고려사항
//! - 키는 passphrase로부터 PBKDF2-HMAC-SHA256(100,000회, 고정 salt)로 한 번만 유도
//! - 각 암호화마다 고유한 nonce (12바이트) 사용, 동일 평문도 매번 다른 토큰
//! - 토큰 형식: URL-safe Base64(`nonce || ciphertext || tag`)
//! - 키 material은 로그나 접근자로 노출하지 않음

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// 암호화 에러
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// 무결성 태그 검증 실패 (키 불일치 또는 변조)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error("UTF-8 decode error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

/// AES-256-GCM nonce 크기 (바이트)
pub const NONCE_SIZE: usize = 12;

/// AES-256 키 크기 (바이트)
pub const KEY_SIZE: usize = 32;

/// GCM 인증 태그 크기 (바이트)
const TAG_SIZE: usize = 16;

/// 키 유도 반복 횟수
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// 키 유도 salt. 모든 레코드가 같은 키를 공유합니다.
pub const KEY_SALT: &[u8] = b"crypto_trading_salt";

/// passphrase 미설정 시 사용되는 기본값. 운영 환경에서는 반드시 교체.
pub const DEFAULT_PASSPHRASE: &str = "crypto-trading-manager-default-key-change-in-production";

/// passphrase 환경 변수 이름
pub const PASSPHRASE_ENV: &str = "DB_ENCRYPTION_KEY";

/// 자격증명 보관소.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("cipher", &"AES-256-GCM")
            .field("key", &"***")
            .finish()
    }
}

impl CredentialVault {
    /// passphrase로부터 키를 유도하여 보관소 생성.
    ///
    /// # Example
    /// ```ignore
    /// let vault = CredentialVault::new("my-long-passphrase")?;
    /// let token = vault.encrypt("api-key")?;
    /// ```
    pub fn new(passphrase: &str) -> Result<Self, CryptoError> {
        let key = derive_key(passphrase);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// `DB_ENCRYPTION_KEY` 환경 변수에서 passphrase를 읽어 생성.
    ///
    /// 환경 변수가 없으면 기본 passphrase를 사용하고 경고를 남깁니다.
    pub fn from_env() -> Result<Self, CryptoError> {
        match std::env::var(PASSPHRASE_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => Self::new(&passphrase),
            _ => {
                tracing::warn!(
                    "{} 미설정: 기본 암호화 passphrase 사용 중 (운영 환경에서 교체 필요)",
                    PASSPHRASE_ENV
                );
                Self::new(DEFAULT_PASSPHRASE)
            }
        }
    }

    /// 랜덤 nonce 생성
    fn generate_nonce() -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// 문자열 암호화.
    ///
    /// 빈 문자열은 빈 문자열로 반환합니다 (에러 아님).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce_bytes = Self::generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::URL_SAFE.encode(token))
    }

    /// 토큰 복호화.
    ///
    /// 빈 문자열은 빈 문자열로 반환합니다.
    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let raw = base64::engine::general_purpose::URL_SAFE.decode(token.trim())?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedToken(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(CryptoError::from)
    }
}

/// PBKDF2-HMAC-SHA256 키 유도
fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KEY_SALT, PBKDF2_ITERATIONS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::OnceLock;

    fn vault() -> &'static CredentialVault {
        static VAULT: OnceLock<CredentialVault> = OnceLock::new();
        VAULT.get_or_init(|| CredentialVault::new("unit-test-passphrase").unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_string() {
        let plaintext = "my-secret-api-key-12345";

        let token = vault().encrypt(plaintext).unwrap();
        let decrypted = vault().decrypt(&token).unwrap();

        assert_eq!(plaintext, decrypted);
        assert!(!token.contains(plaintext));
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let first = vault().encrypt("same-secret").unwrap();
        let second = vault().encrypt("same-secret").unwrap();

        assert_ne!(first, second);
        assert_eq!(vault().decrypt(&first).unwrap(), "same-secret");
        assert_eq!(vault().decrypt(&second).unwrap(), "same-secret");
    }

    #[test]
    fn test_empty_passthrough() {
        assert_eq!(vault().encrypt("").unwrap(), "");
        assert_eq!(vault().decrypt("").unwrap(), "");
    }

    #[test]
    fn test_tampered_token_fails() {
        use base64::Engine;
        let token = vault().encrypt("tamper-me").unwrap();
        let mut raw = base64::engine::general_purpose::URL_SAFE
            .decode(&token)
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::URL_SAFE.encode(raw);

        let result = vault().decrypt(&tampered);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let token = vault().encrypt("secret").unwrap();
        let other = CredentialVault::new("another-passphrase").unwrap();

        assert!(matches!(
            other.decrypt(&token),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            vault().decrypt("not base64 !!"),
            Err(CryptoError::Base64DecodeError(_))
        ));
        assert!(matches!(
            vault().decrypt("AAAA"),
            Err(CryptoError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", vault());
        assert!(debug.contains("***"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(s in "\\PC{1,64}") {
            let token = vault().encrypt(&s).unwrap();
            prop_assert_eq!(vault().decrypt(&token).unwrap(), s);
        }
    }
}
