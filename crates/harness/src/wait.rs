//! Polling with exponential backoff and an overall deadline.
//!
//! [`MountWaiter`] is a pure function of a predicate, a [`WaitSchedule`] and a
//! [`Clock`]; the real mount-table query is just one predicate it can poll.

use std::time::{Duration, Instant};

use mountcheck_core::HarnessConfig;

/// Backoff schedule for [`MountWaiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSchedule {
    /// First sleep interval.
    pub initial: Duration,
    /// Multiplier applied to the interval after every sleep.
    pub ramp: u32,
    /// Upper bound for a single sleep.
    pub max_sleep: Duration,
    /// Give up once this much time has elapsed.
    pub max_wait: Duration,
}

impl Default for WaitSchedule {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            ramp: 2,
            max_sleep: Duration::from_millis(500),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl WaitSchedule {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            initial: config.wait_initial(),
            ramp: config.wait_ramp,
            max_sleep: config.wait_max_sleep(),
            max_wait: config.wait_max_wait(),
        }
    }

    fn next_sleep(&self, current: Duration) -> Duration {
        current.saturating_mul(self.ramp.max(1)).min(self.max_sleep)
    }
}

/// Time source used by [`MountWaiter`].
pub trait Clock {
    /// Time elapsed since some fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of a [`MountWaiter::wait_until`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitReport {
    /// Whether the condition became true before the deadline.
    pub ready: bool,
    /// Number of times the predicate was evaluated.
    pub polls: u32,
    /// Sleep intervals, in order.
    pub sleeps: Vec<Duration>,
}

/// Polls a condition until it holds or the wait budget is spent.
pub struct MountWaiter<C: Clock = SystemClock> {
    schedule: WaitSchedule,
    clock: C,
}

impl MountWaiter<SystemClock> {
    pub fn new(schedule: WaitSchedule) -> Self {
        Self::with_clock(schedule, SystemClock::new())
    }
}

impl<C: Clock> MountWaiter<C> {
    pub fn with_clock(schedule: WaitSchedule, clock: C) -> Self {
        Self { schedule, clock }
    }

    pub fn schedule(&self) -> &WaitSchedule {
        &self.schedule
    }

    /// Evaluate `condition` until it returns true or the budget is exceeded.
    ///
    /// The condition is checked before every sleep, so an already-true
    /// condition returns without sleeping at all.
    pub fn wait_until<F>(&self, mut condition: F) -> WaitReport
    where
        F: FnMut() -> bool,
    {
        let start = self.clock.now();
        let mut sleep = self.schedule.initial.min(self.schedule.max_sleep);
        let mut report = WaitReport {
            ready: false,
            polls: 0,
            sleeps: Vec::new(),
        };

        loop {
            report.polls += 1;
            if condition() {
                report.ready = true;
                return report;
            }
            if self.clock.now().saturating_sub(start) >= self.schedule.max_wait {
                return report;
            }
            self.clock.sleep(sleep);
            report.sleeps.push(sleep);
            sleep = self.schedule.next_sleep(sleep);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Clock that advances only when slept on.
    #[derive(Default)]
    pub(crate) struct FakeClock {
        now: Cell<Duration>,
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.now.set(self.now.get() + duration);
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn immediate_success_does_not_sleep() {
        let waiter = MountWaiter::with_clock(WaitSchedule::default(), FakeClock::default());
        let report = waiter.wait_until(|| true);
        assert!(report.ready);
        assert_eq!(report.polls, 1);
        assert!(report.sleeps.is_empty());
    }

    #[test]
    fn returns_on_first_true_poll() {
        let waiter = MountWaiter::with_clock(WaitSchedule::default(), FakeClock::default());
        let calls = Cell::new(0);
        let report = waiter.wait_until(|| {
            calls.set(calls.get() + 1);
            calls.get() == 4
        });
        assert!(report.ready);
        assert_eq!(report.polls, 4);
        assert_eq!(calls.get(), 4);
        assert_eq!(report.sleeps, vec![ms(10), ms(20), ms(40)]);
    }

    #[test]
    fn default_schedule_ramps_and_caps() {
        let waiter = MountWaiter::with_clock(WaitSchedule::default(), FakeClock::default());
        let report = waiter.wait_until(|| false);
        assert!(!report.ready);
        assert_eq!(
            &report.sleeps[..7],
            &[ms(10), ms(20), ms(40), ms(80), ms(160), ms(320), ms(500)]
        );
        assert!(report.sleeps[7..].iter().all(|s| *s == ms(500)));
        let total: Duration = report.sleeps.iter().sum();
        assert!(total >= Duration::from_secs(5));
        assert!(total < Duration::from_secs(5) + ms(500));
    }

    #[test]
    fn sleeps_are_non_decreasing_and_capped_for_many_schedules() {
        for initial in [1, 7, 10, 100, 500] {
            for ramp in [1, 2, 3, 10] {
                for cap in [500, 1000] {
                    let schedule = WaitSchedule {
                        initial: ms(initial),
                        ramp,
                        max_sleep: ms(cap),
                        max_wait: ms(3000),
                    };
                    let waiter = MountWaiter::with_clock(schedule, FakeClock::default());
                    let report = waiter.wait_until(|| false);
                    assert!(!report.ready);
                    assert!(!report.sleeps.is_empty());
                    for pair in report.sleeps.windows(2) {
                        assert!(pair[0] <= pair[1], "{schedule:?}: {:?}", report.sleeps);
                    }
                    assert!(report.sleeps.iter().all(|s| *s <= ms(cap)));
                }
            }
        }
    }

    #[test]
    fn initial_above_cap_is_clamped() {
        let schedule = WaitSchedule {
            initial: ms(900),
            ramp: 2,
            max_sleep: ms(300),
            max_wait: ms(1000),
        };
        let waiter = MountWaiter::with_clock(schedule, FakeClock::default());
        let report = waiter.wait_until(|| false);
        assert!(report.sleeps.iter().all(|s| *s == ms(300)));
    }

    #[test]
    fn zero_budget_polls_exactly_once() {
        let schedule = WaitSchedule {
            max_wait: Duration::ZERO,
            ..WaitSchedule::default()
        };
        let waiter = MountWaiter::with_clock(schedule, FakeClock::default());
        let report = waiter.wait_until(|| false);
        assert!(!report.ready);
        assert_eq!(report.polls, 1);
    }

    #[test]
    fn real_clock_respects_budget() {
        let schedule = WaitSchedule {
            initial: ms(1),
            ramp: 2,
            max_sleep: ms(20),
            max_wait: ms(100),
        };
        let started = Instant::now();
        let report = MountWaiter::new(schedule).wait_until(|| false);
        assert!(!report.ready);
        assert!(started.elapsed() >= ms(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
