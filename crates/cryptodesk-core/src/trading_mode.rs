//! 트레이딩 모드 게이트.
//!
//! dry_run / demo / live 3가지 모드와 이와 독립적인 dry-run override를 관리합니다.
//! 주문/잔고 호출이 실제 거래소로 나갈지, 시뮬레이션으로 응답할지를 결정합니다.
//!
//! # 불변식
//!
//! `is_live_trading() ⇒ mode == Live ∧ ¬override`
//!
//! override는 한 번 켜지면 프로세스가 재시작될 때까지 유지됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{info, warn};

/// 트레이딩 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// 주문 없이 시뮬레이션만 수행
    DryRun,
    /// 데모 데이터로 시뮬레이션
    Demo,
    /// 실거래
    Live,
}

impl TradingMode {
    /// 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::DryRun => "dry_run",
            TradingMode::Demo => "demo",
            TradingMode::Live => "live",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry_run" => Ok(TradingMode::DryRun),
            "demo" => Ok(TradingMode::Demo),
            "live" => Ok(TradingMode::Live),
            _ => Err(format!(
                "Invalid trading mode: {}. Options: dry_run, demo, live",
                s
            )),
        }
    }
}

/// 실거래 가능 여부 검사 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveTradingCheck {
    pub can_trade_live: bool,
    /// 첫 번째로 실패한 조건 또는 성공 메시지
    pub reason: String,
}

impl LiveTradingCheck {
    fn passed() -> Self {
        Self {
            can_trade_live: true,
            reason: "Live trading requirements met".to_string(),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            can_trade_live: false,
            reason: reason.into(),
        }
    }
}

/// 게이트 상태 스냅샷.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradingModeStatus {
    pub current_mode: TradingMode,
    pub dry_run_enabled: bool,
    pub is_live_trading: bool,
    pub dry_run_override: bool,
    pub warning_message: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct GateState {
    mode: TradingMode,
    dry_run_override: bool,
}

impl GateState {
    fn is_dry_run_enabled(&self) -> bool {
        self.dry_run_override || self.mode != TradingMode::Live
    }

    fn is_live_trading(&self) -> bool {
        self.mode == TradingMode::Live && !self.dry_run_override
    }

    fn warning(&self) -> &'static str {
        match (self.mode, self.dry_run_override) {
            (TradingMode::DryRun, _) => "⚠️ DRY RUN MODE - No real trades are executed",
            (TradingMode::Demo, _) => "🧪 DEMO MODE - Trades are simulated with demo data",
            (TradingMode::Live, true) => "🔒 LIVE MODE with DRY RUN - Safety lock active",
            (TradingMode::Live, false) => "🔴 LIVE TRADING MODE - Real trades are executed!",
        }
    }
}

/// 트레이딩 모드 게이트.
///
/// 애플리케이션 상태에 `Arc<TradingModeGate>`로 주입되어 모든 요청이 공유합니다.
/// 잠금은 I/O 경계를 넘어 유지되지 않습니다.
#[derive(Debug)]
pub struct TradingModeGate {
    state: RwLock<GateState>,
}

impl TradingModeGate {
    /// 초기 모드와 override로 게이트 생성.
    pub fn new(mode: TradingMode, dry_run_override: bool) -> Self {
        Self {
            state: RwLock::new(GateState {
                mode,
                dry_run_override,
            }),
        }
    }

    fn read(&self) -> GateState {
        // 상태가 Copy이므로 poison 되어도 마지막 값은 유효
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// 현재 모드.
    pub fn current_mode(&self) -> TradingMode {
        self.read().mode
    }

    /// override 활성화 여부.
    pub fn dry_run_override(&self) -> bool {
        self.read().dry_run_override
    }

    /// `override ∨ mode ≠ live`
    pub fn is_dry_run_enabled(&self) -> bool {
        self.read().is_dry_run_enabled()
    }

    /// `mode == live ∧ ¬override`
    pub fn is_live_trading(&self) -> bool {
        self.read().is_live_trading()
    }

    /// 모드 전환.
    ///
    /// `force_dry_run`이 true면 override를 켭니다. false는 override를 끄지 않습니다.
    pub fn set_mode(&self, mode: TradingMode, force_dry_run: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.mode = mode;
        if force_dry_run {
            state.dry_run_override = true;
        }
        info!(
            mode = %state.mode,
            dry_run = state.dry_run_override,
            "Trading mode set"
        );
    }

    /// 비상 dry-run: 현재 모드는 유지하고 override만 켭니다.
    pub fn enable_emergency_dry_run(&self) -> TradingMode {
        let mode = self.current_mode();
        self.set_mode(mode, true);
        warn!(mode = %mode, "🔒 Dry-run mode force enabled for safety");
        mode
    }

    /// 현재 모드의 경고 문구.
    pub fn mode_warning(&self) -> &'static str {
        self.read().warning()
    }

    /// 실거래 요건 검사.
    ///
    /// 우선순위: 자격증명 → 모드 → override
    pub fn validate_live_trading_requirements(&self, credentials_configured: bool) -> LiveTradingCheck {
        let state = self.read();

        if !credentials_configured {
            return LiveTradingCheck::failed("API credentials not configured");
        }
        if state.mode != TradingMode::Live {
            return LiveTradingCheck::failed(format!(
                "Trading mode is {}, not live",
                state.mode
            ));
        }
        if state.dry_run_override {
            return LiveTradingCheck::failed("Dry run mode is still active");
        }

        LiveTradingCheck::passed()
    }

    /// live로 전환하기 전 사전 검사.
    ///
    /// 전환 후 상태(mode == live)를 기준으로 자격증명과 override만 확인합니다.
    pub fn validate_live_transition(&self, credentials_configured: bool) -> LiveTradingCheck {
        if !credentials_configured {
            return LiveTradingCheck::failed("API credentials not configured");
        }
        if self.dry_run_override() {
            return LiveTradingCheck::failed("Dry run mode is still active");
        }
        LiveTradingCheck::passed()
    }

    /// 상태 스냅샷.
    pub fn snapshot(&self) -> TradingModeStatus {
        let state = self.read();
        TradingModeStatus {
            current_mode: state.mode,
            dry_run_enabled: state.is_dry_run_enabled(),
            is_live_trading: state.is_live_trading(),
            dry_run_override: state.dry_run_override,
            warning_message: state.warning(),
        }
    }
}

impl Default for TradingModeGate {
    fn default() -> Self {
        Self::new(TradingMode::DryRun, true)
    }
}
