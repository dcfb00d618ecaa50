//! dry-run/demo 모드 응답 시뮬레이션.
//!
//! 게이트가 실거래를 막고 있을 때 주문, 잔고, 취소 요청에 대해
//! 네트워크 호출 없이 거래소 형식의 합성 응답을 만듭니다.
//!
//! # 예제
//!
//! ```
//! use cryptodesk_core::{SimulationConfig, TradingMode};
//! use cryptodesk_exchange::{OrderPayload, SimulationEngine};
//!
//! let engine = SimulationEngine::new(SimulationConfig::default());
//! let order = OrderPayload::new("BTC-EUR", "buy", "market").with_amount(0.01);
//!
//! let response = engine.simulate_order_response(&order, TradingMode::DryRun);
//! assert!(response.simulated);
//! assert_eq!(response.status, "filled");
//! ```

mod engine;

pub use engine::{SimulatedBalanceEntry, SimulatedOrder, SimulationEngine};
