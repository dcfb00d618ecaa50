//! 거래소 연결 및 주문 게이트웨이.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Bitvavo 커넥터 (HMAC 서명 REST)
//! - 트레이딩 모드에 따른 dry-run 차단과 시뮬레이션 응답
//! - 가중치 기반 슬라이딩 윈도우 rate limiting
//! - 상태 코드 기반 에러 분류

pub mod connector;
pub mod error;
pub mod gateway;
pub mod rate_limiter;
pub mod simulated;
pub mod types;

pub use connector::{BitvavoClient, BitvavoConfig, BitvavoCredentials};
pub use error::*;
pub use gateway::{validate_order, ExchangeGateway, MAX_BATCH_ORDERS};
pub use rate_limiter::{RateLimitStatus, RequestWeight, SlidingWindowLimiter};
pub use simulated::{SimulatedBalanceEntry, SimulatedOrder, SimulationEngine};
pub use types::*;
