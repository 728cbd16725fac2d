//! 재시도 실행: 일시적 실패를 흡수하는 지터 포함 재시도 래퍼
//!
//! [`RetryRunner`]는 블록을 실행하고, 에러가 나면 남은 시도 횟수만큼
//! `sleep_base ± random(jitter / 2)` 만큼 쉬었다가 다시 실행합니다.
//! 시도가 모두 소진되면 마지막 에러를 그대로 돌려줍니다.
//!
//! # 사용 예시
//! ```
//! use std::time::Duration;
//! use mountcheck_core::retry::RetryRunner;
//!
//! let runner = RetryRunner::new(2, Duration::ZERO, Duration::ZERO);
//! let mut calls = 0;
//! let result: Result<u32, String> = runner.run("example", |_| {
//!     calls += 1;
//!     if calls < 3 { Err("transient".to_owned()) } else { Ok(calls) }
//! });
//! assert_eq!(result, Ok(3));
//! ```

use std::fmt::Display;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// 재시도 실행기
///
/// 하네스의 서비스 기동과 VM 러너의 기동 단계가 공유합니다.
#[derive(Debug, Clone, Copy)]
pub struct RetryRunner {
    /// 첫 시도 이후 추가로 허용되는 시도 횟수
    max_extra_attempts: u32,
    /// 재시도 대기 기본 간격
    sleep_base: Duration,
    /// 재시도 대기 지터 폭 (±절반)
    sleep_jitter: Duration,
    /// 대기 함수 (테스트에서 교체)
    sleeper: fn(Duration),
}

impl RetryRunner {
    /// 새 재시도 실행기를 생성합니다.
    pub fn new(max_extra_attempts: u32, sleep_base: Duration, sleep_jitter: Duration) -> Self {
        Self {
            max_extra_attempts,
            sleep_base,
            sleep_jitter,
            sleeper: std::thread::sleep,
        }
    }

    /// 재시도 없이 한 번만 실행하는 실행기
    pub fn once() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// 대기 함수를 교체합니다.
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_extra_attempts(&self) -> u32 {
        self.max_extra_attempts
    }

    /// 블록을 실행하고 실패 시 재시도합니다.
    ///
    /// 블록에는 0부터 시작하는 시도 번호가 전달됩니다.
    pub fn run<T, E, F>(&self, label: &str, mut block: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match block(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_extra_attempts => {
                    let delay = self.next_delay();
                    warn!(
                        label,
                        attempt = attempt + 1,
                        remaining = self.max_extra_attempts - attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "attempt failed, retrying"
                    );
                    (self.sleeper)(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 다음 재시도 대기 시간을 계산합니다.
    ///
    /// 결과는 항상 `[base - jitter/2, base + jitter/2]` 안에 있고 0 미만으로 내려가지 않습니다.
    pub fn next_delay(&self) -> Duration {
        let half = self.sleep_jitter / 2;
        if half.is_zero() {
            return self.sleep_base;
        }
        let half_nanos = u64::try_from(half.as_nanos()).unwrap_or(u64::MAX);
        let offset = rand::rng().random_range(0..=half_nanos.saturating_mul(2));
        let low = self.sleep_base.saturating_sub(half);
        let delay = low + Duration::from_nanos(offset);
        // base가 half보다 작으면 하한이 0으로 잘리므로 상한만 맞춥니다.
        delay.min(self.sleep_base + half)
    }
}
