//! 가중치 기반 슬라이딩 윈도우 rate limiter.
//!
//! 최근 60초 동안 기록된 요청 가중치의 합이 분당 한도를 넘지 않도록 합니다.
//! 확인과 기록은 [`SlidingWindowLimiter::try_acquire`]에서 하나의 잠금 안에서 수행됩니다.
//!
//! 모든 연산에는 시각을 직접 받는 `_at` 변형이 있어 테스트에서 시간을 조작할 수 있습니다.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::{ExchangeError, ExchangeResult};

/// 윈도우 길이.
pub const WINDOW: Duration = Duration::from_secs(60);

/// 작업 유형별 요청 가중치.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestWeight {
    MarketData,
    Balance,
    Cancel,
    Order,
}

impl RequestWeight {
    pub fn value(self) -> u32 {
        match self {
            RequestWeight::MarketData => 1,
            RequestWeight::Balance => 5,
            RequestWeight::Cancel => 5,
            RequestWeight::Order => 10,
        }
    }
}

/// 현재 한도 상태.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub current_requests: u32,
    pub max_requests: u32,
    pub remaining_requests: u32,
    /// 다음 reset 시점까지 남은 초
    pub time_until_reset: u64,
}

#[derive(Debug)]
struct WindowState {
    entries: VecDeque<(Instant, u32)>,
    reset_at: Instant,
}

impl WindowState {
    fn purge(&mut self, now: Instant) {
        while let Some((recorded, _)) = self.entries.front() {
            if now.saturating_duration_since(*recorded) >= WINDOW {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        if now >= self.reset_at {
            self.reset_at = now + WINDOW;
        }
    }

    fn current(&self) -> u32 {
        self.entries.iter().map(|(_, weight)| weight).sum()
    }

    fn time_until_reset(&self, now: Instant) -> u64 {
        self.reset_at.saturating_duration_since(now).as_secs_f64().ceil() as u64
    }
}

/// 슬라이딩 윈도우 rate limiter.
///
/// 애플리케이션 상태에 `Arc`로 공유됩니다.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_per_minute: u32,
    state: Mutex<WindowState>,
}

impl SlidingWindowLimiter {
    /// 분당 한도로 생성.
    pub fn new(max_per_minute: u32) -> Self {
        Self::new_at(max_per_minute, Instant::now())
    }

    /// 지정 시각 기준으로 생성.
    pub fn new_at(max_per_minute: u32, now: Instant) -> Self {
        Self {
            max_per_minute,
            state: Mutex::new(WindowState {
                entries: VecDeque::new(),
                reset_at: now + WINDOW,
            }),
        }
    }

    pub fn max_per_minute(&self) -> u32 {
        self.max_per_minute
    }

    fn with_state<T>(&self, now: Instant, f: impl FnOnce(&mut WindowState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.purge(now);
        f(&mut state)
    }

    /// 가중치만큼 여유가 있는지 확인 (기록하지 않음).
    pub fn can_make_request(&self, weight: u32) -> bool {
        self.can_make_request_at(weight, Instant::now())
    }

    pub fn can_make_request_at(&self, weight: u32, now: Instant) -> bool {
        let max = self.max_per_minute;
        self.with_state(now, |state| state.current() + weight <= max)
    }

    /// 요청 기록 (확인하지 않음).
    pub fn add_request(&self, weight: u32) {
        self.add_request_at(weight, Instant::now());
    }

    pub fn add_request_at(&self, weight: u32, now: Instant) {
        self.with_state(now, |state| state.entries.push_back((now, weight)));
    }

    /// 확인과 기록을 한 번에 수행.
    ///
    /// # Errors
    /// 한도를 넘으면 reset까지 남은 시간과 함께 `ExchangeError::RateLimited`를 반환합니다.
    pub fn try_acquire(&self, weight: RequestWeight) -> ExchangeResult<()> {
        self.try_acquire_at(weight.value(), Instant::now())
    }

    pub fn try_acquire_at(&self, weight: u32, now: Instant) -> ExchangeResult<()> {
        let max = self.max_per_minute;
        self.with_state(now, |state| {
            let current = state.current();
            if current + weight <= max {
                state.entries.push_back((now, weight));
                Ok(())
            } else {
                let retry_after_secs = state.time_until_reset(now);
                warn!(current, weight, max, retry_after_secs, "Rate limit exceeded");
                Err(ExchangeError::RateLimited { retry_after_secs })
            }
        })
    }

    /// reset 시점까지 남은 초.
    pub fn time_until_reset(&self) -> u64 {
        self.time_until_reset_at(Instant::now())
    }

    pub fn time_until_reset_at(&self, now: Instant) -> u64 {
        self.with_state(now, |state| state.time_until_reset(now))
    }

    /// 현재 상태.
    pub fn status(&self) -> RateLimitStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> RateLimitStatus {
        let max = self.max_per_minute;
        self.with_state(now, |state| {
            let current = state.current();
            RateLimitStatus {
                current_requests: current,
                max_requests: max,
                remaining_requests: max.saturating_sub(current),
                time_until_reset: state.time_until_reset(now),
            }
        })
    }
}
