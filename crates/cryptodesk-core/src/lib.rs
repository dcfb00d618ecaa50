//! # Cryptodesk Core
//!
//! 암호화폐 트레이딩 게이트웨이의 핵심 도메인 모델과 공통 인프라를 제공합니다.
//!
//! - 주문, 체결, 포지션 도메인 타입
//! - 트레이딩 모드 게이트 (dry run / demo / live)
//! - 포트폴리오, 리스크, 시장 지표 계산 서비스
//! - 설정 관리
//! - 로깅 인프라
//! - 자격증명 암호화

pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod logging;
pub mod services;
pub mod trading_mode;

pub use config::*;
pub use crypto::{CredentialVault, CryptoError};
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use trading_mode::*;
