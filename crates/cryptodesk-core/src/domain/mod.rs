//! 트레이딩 도메인 모델 및 보조 계산.

mod calculations;
mod order;
mod position;

pub use calculations::*;
pub use order::*;
pub use position::*;
