//! 도메인 서비스.
//!
//! 포트폴리오 손익, 리스크 점수, 시장 지표, 주문 보조 로직을 제공하는 순수 함수 모음입니다.
//! 모든 함수는 I/O 없이 입력 레코드만으로 결과를 계산합니다.

pub mod market;
pub mod portfolio;
pub mod risk;
pub mod trading;
